//! The top-level client façade: one HTTP connection pool, fronting
//! `execute`/`executeMany`, the DDL/DML convenience methods, and streaming
//! query iteration.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, RowMode};
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::response::{BulkResponse, QueryResponse, RawBulkResponse, RawQueryResponse};
use crate::serializer::{self, SqlArg};
use crate::statement::{self, ColumnDef, CreateTableOptions, OptimizeValue};
use crate::transport::{ReqwestTransport, Transport};

const SQL_PATH: &str = "/_sql?types";

/// Async client for CrateDB's native HTTP/JSON SQL endpoint.
///
/// Cheap to clone: the connection pool and configuration are shared
/// through an `Arc`, the same way a single [`reqwest::Client`] is meant
/// to be reused across a program.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Client> {
        let transport = ReqwestTransport::new(config.clone())?;
        Ok(Client::with_transport(config, Arc::new(transport)))
    }

    pub fn from_env() -> Result<Client> {
        Client::new(ClientConfig::from_env()?)
    }

    /// Build a client around a caller-supplied [`Transport`] — a fake for
    /// tests, or a decorated transport that adds tracing/metrics.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Client {
        Client {
            config: Arc::new(config),
            transport,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run a single statement and return its decoded result.
    pub async fn execute(&self, sql: &str, args: &[SqlArg]) -> Result<QueryResponse> {
        self.execute_cancellable(sql, args, None).await
    }

    /// Same as [`Client::execute`], but aborts the in-flight request (and
    /// surfaces a [`Error::RequestError`]) the moment `cancellation` fires.
    pub async fn execute_cancellable(
        &self,
        sql: &str,
        args: &[SqlArg],
        cancellation: Option<&CancellationToken>,
    ) -> Result<QueryResponse> {
        let body = serializer::encode(sql, args);
        let raw = self.transport.send(SQL_PATH, body, cancellation).await?;
        let parsed: RawQueryResponse = serde_json::from_value(raw.body.clone())?;
        QueryResponse::from_raw(parsed, &raw, &self.config)
    }

    /// Run the same statement once per row of `bulk_args`.
    pub async fn execute_many(&self, sql: &str, bulk_args: &[Vec<SqlArg>]) -> Result<BulkResponse> {
        self.execute_many_cancellable(sql, bulk_args, None).await
    }

    /// Same as [`Client::execute_many`], with the same cancellation
    /// behavior as [`Client::execute_cancellable`].
    pub async fn execute_many_cancellable(
        &self,
        sql: &str,
        bulk_args: &[Vec<SqlArg>],
        cancellation: Option<&CancellationToken>,
    ) -> Result<BulkResponse> {
        if bulk_args.is_empty() {
            return Err(Error::ValidationError(
                "executeMany requires at least one row of bulk args".into(),
            ));
        }
        let body = serializer::encode_bulk(sql, bulk_args);
        let raw = self.transport.send(SQL_PATH, body, cancellation).await?;
        let parsed: RawBulkResponse = serde_json::from_value(raw.body.clone())?;
        Ok(BulkResponse::from_raw(parsed, &raw))
    }

    /// Decoded rows, shaped per [`ClientConfig::row_mode`].
    pub async fn query(&self, sql: &str, args: &[SqlArg]) -> Result<Vec<serde_json::Value>> {
        let response = self.execute(sql, args).await?;
        Ok(response.reshape_rows(self.config.row_mode))
    }

    /// Same as [`Client::query`], but with an explicit row shape rather
    /// than the configured default.
    pub async fn query_with_mode(
        &self,
        sql: &str,
        args: &[SqlArg],
        mode: RowMode,
    ) -> Result<Vec<serde_json::Value>> {
        let response = self.execute(sql, args).await?;
        Ok(response.reshape_rows(mode))
    }

    pub async fn create_table(
        &self,
        table: &str,
        columns: &[ColumnDef],
        options: &CreateTableOptions,
    ) -> Result<QueryResponse> {
        let sql = statement::create_table(table, columns, options)?;
        self.execute(&sql, &[]).await
    }

    pub async fn insert(&self, table: &str, keys: &[String], values: Vec<SqlArg>) -> Result<QueryResponse> {
        self.insert_with_conflict(table, keys, values, None).await
    }

    pub async fn insert_with_conflict(
        &self,
        table: &str,
        keys: &[String],
        values: Vec<SqlArg>,
        primary_keys: Option<&[String]>,
    ) -> Result<QueryResponse> {
        if table.is_empty() {
            return Err(Error::ValidationError("insert: table name must not be empty".into()));
        }
        if keys.is_empty() {
            return Err(Error::ValidationError("insert: object must have at least one field".into()));
        }
        if keys.len() != values.len() {
            return Err(Error::ValidationError(format!(
                "insert: {} keys but {} values",
                keys.len(),
                values.len()
            )));
        }
        let sql = statement::insert(table, keys, primary_keys);
        self.execute(&sql, &values).await
    }

    /// Batch-insert rows that already share one key order, aligned
    /// positionally with `keys`. Most callers want [`Client::insert_many`]
    /// instead, which accepts heterogeneous per-row fields and computes
    /// that alignment itself.
    pub async fn insert_many_aligned(
        &self,
        table: &str,
        keys: &[String],
        rows: Vec<Vec<SqlArg>>,
        primary_keys: Option<&[String]>,
    ) -> Result<BulkResponse> {
        if table.is_empty() {
            return Err(Error::ValidationError("insertMany: table name must not be empty".into()));
        }
        if keys.is_empty() {
            return Err(Error::ValidationError("insertMany: objects must have at least one field".into()));
        }
        if rows.is_empty() {
            return Err(Error::ValidationError("insertMany: jsonArray must not be empty".into()));
        }
        for row in &rows {
            if row.len() != keys.len() {
                return Err(Error::ValidationError(format!(
                    "insertMany: {} keys but a row with {} values",
                    keys.len(),
                    row.len()
                )));
            }
        }
        let sql = statement::insert(table, keys, primary_keys);
        self.execute_many(&sql, &rows).await
    }

    /// Batch-insert possibly-heterogeneous rows, each given as its own
    /// ordered list of `(column, value)` pairs. The column order bound
    /// into the statement is the union of every row's keys, in the order
    /// each key is first seen; rows missing a key get `NULL` there.
    pub async fn insert_many(
        &self,
        table: &str,
        rows: Vec<Vec<(String, SqlArg)>>,
        primary_keys: Option<&[String]>,
    ) -> Result<BulkResponse> {
        let start = Instant::now();
        if rows.is_empty() {
            return Err(Error::ValidationError("insertMany: jsonArray must not be empty".into()));
        }

        let mut keys: Vec<String> = Vec::new();
        for row in &rows {
            for (key, _) in row {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }

        let aligned: Vec<Vec<SqlArg>> = rows
            .into_iter()
            .map(|row| {
                keys.iter()
                    .map(|key| {
                        row.iter()
                            .find(|(k, _)| k == key)
                            .map(|(_, v)| v.clone())
                            .unwrap_or(SqlArg::Null)
                    })
                    .collect()
            })
            .collect();

        let mut response = self.insert_many_aligned(table, &keys, aligned, primary_keys).await?;
        let total_ms = start.elapsed().as_secs_f64() * 1000.0;
        let transport_and_server = response.durations.request_ms + response.durations.cratedb_ms;
        response.durations.preparation_ms = Some((total_ms - transport_and_server).max(0.0));
        response.durations.total_ms = Some(total_ms);
        Ok(response)
    }

    pub async fn update(
        &self,
        table: &str,
        columns: &[String],
        values: Vec<SqlArg>,
        where_clause: &str,
    ) -> Result<QueryResponse> {
        if columns.len() != values.len() {
            return Err(Error::ValidationError(format!(
                "update: {} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        let sql = statement::update(table, columns, where_clause);
        self.execute(&sql, &values).await
    }

    pub async fn delete(&self, table: &str, where_clause: &str) -> Result<QueryResponse> {
        let sql = statement::delete(table, where_clause);
        self.execute(&sql, &[]).await
    }

    pub async fn drop_table(&self, table: &str) -> Result<QueryResponse> {
        let sql = statement::drop_table(table);
        self.execute(&sql, &[]).await
    }

    pub async fn refresh(&self, table: &str) -> Result<QueryResponse> {
        let sql = statement::refresh(table);
        self.execute(&sql, &[]).await
    }

    pub async fn optimize(
        &self,
        table: &str,
        options: Option<&[(&str, OptimizeValue<'_>)]>,
        partitions: Option<&[(&str, OptimizeValue<'_>)]>,
    ) -> Result<QueryResponse> {
        let sql = statement::optimize(table, options, partitions);
        self.execute(&sql, &[]).await
    }

    /// The primary-key column names of `table`, in declared order.
    ///
    /// `table` may be schema-qualified (`"myschema.t"`); a bare table name
    /// defaults to the `doc` schema.
    pub async fn get_primary_keys(&self, table: &str) -> Result<Vec<String>> {
        let (schema, table) = match table.split_once('.') {
            Some((schema, table)) => (schema, table),
            None => ("doc", table),
        };
        let args: Vec<SqlArg> = vec![schema.into(), table.into()];
        let response = self.execute(statement::GET_PRIMARY_KEYS_SQL, &args).await?;
        response
            .rows
            .into_iter()
            .map(|mut row| match row.pop() {
                Some(cell) => match cell.into_json() {
                    serde_json::Value::String(s) => Ok(s),
                    other => Err(Error::DeserializationError(format!(
                        "expected column_name to be a string, got {other}"
                    ))),
                },
                None => Err(Error::DeserializationError("empty primary key row".into())),
            })
            .collect()
    }

    /// Lazily stream a query's rows one page at a time, via a server-side
    /// cursor pinned to a single connection.
    pub async fn stream_query(
        &self,
        sql: &str,
        args: &[SqlArg],
        fetch_size: u32,
    ) -> Result<impl Stream<Item = Result<serde_json::Value>>> {
        let mode = self.config.row_mode;
        let cursor = self.create_cursor(sql, args).await?;
        Ok(cursor.iterate(fetch_size, mode))
    }

    /// Open a server-side cursor pinned to a single connection.
    pub async fn create_cursor(&self, sql: &str, args: &[SqlArg]) -> Result<Cursor> {
        Cursor::open(self.config.clone(), sql, args).await
    }
}

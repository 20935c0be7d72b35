//! Async client for CrateDB's native HTTP/JSON SQL endpoint (`/_sql`).
//!
//! ```no_run
//! use cratedb::{Client, ClientConfig, SqlArg};
//!
//! # async fn run() -> cratedb::Result<()> {
//! let client = Client::new(ClientConfig::from_env()?)?;
//! let rows = client.query("select id, name from t where id = ?", &[1i64.into()]).await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod coltype;
pub mod config;
pub mod cursor;
pub mod error;
pub mod response;
pub mod serializer;
pub mod statement;
pub mod transport;
pub mod value;

pub use client::Client;
pub use config::{ClientConfig, DeserializationConfig, LongPolicy, RowMode, TemporalPolicy};
pub use coltype::{ColTypeEntry, ColumnType};
pub use cursor::{Cursor, CursorState};
pub use error::{CrateDbError, Error, Result};
pub use response::{BulkError, BulkResponse, BulkResult, QueryResponse, ResponseDurations, ResponseSizes};
pub use serializer::SqlArg;
pub use statement::{ColumnDef, CreateTableOptions, ObjectMode, OptimizeValue};
pub use transport::Transport;
pub use value::CellValue;

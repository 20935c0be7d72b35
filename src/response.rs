//! Wire-shaped response envelopes and the typed values derived from them.
//!
//! [`RawQueryResponse`]/[`RawBulkResponse`] mirror the JSON CrateDB actually
//! sends back; [`QueryResponse`] is what callers see, with each cell
//! already run through [`crate::serializer::decode_row`].

use serde::Deserialize;

use crate::coltype::ColTypeEntry;
use crate::config::{ClientConfig, RowMode};
use crate::error::Result;
use crate::serializer;
use crate::transport::RawResponse;
use crate::value::CellValue;

/// The server's own sentinel for a failed row within a bulk response.
const BULK_ERROR_ROWCOUNT: i64 = -2;

/// Client-added timing breakdown attached to every successful response.
/// `cratedb` is the server's own self-reported processing time; `request`
/// is the wall-clock time spent on transport minus that; `preparation` and
/// `total` are only populated by callers that do local work before or
/// around the wire exchange (e.g. `insertMany`'s key-union step).
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseDurations {
    pub cratedb_ms: f64,
    pub request_ms: f64,
    pub preparation_ms: Option<f64>,
    pub total_ms: Option<f64>,
}

/// Client-added wire sizes attached to every successful response.
/// `request_uncompressed_bytes` is always the pre-compression payload
/// length, equal to `request_bytes` when compression didn't trigger.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseSizes {
    pub request_bytes: usize,
    pub response_bytes: usize,
    pub request_uncompressed_bytes: Option<usize>,
}

impl ResponseDurations {
    /// Split a transport-measured wall time using the server's own
    /// self-reported `duration`.
    pub fn from_transport(wall_ms: f64, cratedb_ms: f64) -> ResponseDurations {
        ResponseDurations {
            cratedb_ms,
            request_ms: (wall_ms - cratedb_ms).max(0.0),
            preparation_ms: None,
            total_ms: None,
        }
    }
}

impl From<crate::transport::Sizes> for ResponseSizes {
    fn from(sizes: crate::transport::Sizes) -> ResponseSizes {
        ResponseSizes {
            request_bytes: sizes.request_bytes,
            response_bytes: sizes.response_bytes,
            request_uncompressed_bytes: sizes.request_uncompressed_bytes,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawQueryResponse {
    pub cols: Vec<String>,
    #[serde(default)]
    pub col_types: Vec<ColTypeEntry>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
    pub rowcount: i64,
    #[serde(default)]
    pub duration: f64,
}

/// A single sub-operation's structured error body, when the server
/// reports one alongside the `-2` sentinel rowcount.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkError {
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkResult {
    pub rowcount: i64,
    #[serde(default)]
    pub error: Option<BulkError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBulkResponse {
    #[serde(default)]
    pub cols: Vec<String>,
    #[serde(default)]
    pub duration: f64,
    pub results: Vec<BulkResult>,
}

/// A fully decoded single-statement result.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub cols: Vec<String>,
    pub col_types: Vec<ColTypeEntry>,
    pub rows: Vec<Vec<CellValue>>,
    pub rowcount: i64,
    pub duration: f64,
    pub durations: ResponseDurations,
    pub sizes: ResponseSizes,
}

impl QueryResponse {
    pub fn from_raw(
        raw: RawQueryResponse,
        transport: &RawResponse,
        config: &ClientConfig,
    ) -> Result<QueryResponse> {
        let rows = raw
            .rows
            .iter()
            .map(|row| serializer::decode_row(row, &raw.col_types, &config.deserialization))
            .collect::<Result<Vec<_>>>()?;
        Ok(QueryResponse {
            cols: raw.cols,
            col_types: raw.col_types,
            rows,
            rowcount: raw.rowcount,
            duration: raw.duration,
            durations: ResponseDurations::from_transport(
                transport.durations.request_ms,
                raw.duration,
            ),
            sizes: transport.sizes.into(),
        })
    }

    /// Shape a decoded row according to [`RowMode`]: a bare array of
    /// values, or an object keyed by column name.
    pub fn reshape_row(&self, row: &[CellValue], mode: RowMode) -> serde_json::Value {
        match mode {
            RowMode::Array => {
                serde_json::Value::Array(row.iter().cloned().map(CellValue::into_json).collect())
            }
            RowMode::Object => {
                let mut obj = serde_json::Map::with_capacity(row.len());
                for (name, cell) in self.cols.iter().zip(row) {
                    obj.insert(name.clone(), cell.clone().into_json());
                }
                serde_json::Value::Object(obj)
            }
        }
    }

    pub fn reshape_rows(&self, mode: RowMode) -> Vec<serde_json::Value> {
        self.rows.iter().map(|row| self.reshape_row(row, mode)).collect()
    }
}

/// A fully decoded batched-statement result: one [`BulkResult`] per row of
/// `bulk_args` that was sent, in the same order, plus the derived index
/// list of sub-operations the server flagged with the `-2` sentinel.
#[derive(Debug, Clone)]
pub struct BulkResponse {
    pub cols: Vec<String>,
    pub duration: f64,
    pub results: Vec<BulkResult>,
    pub bulk_errors: Vec<usize>,
    pub durations: ResponseDurations,
    pub sizes: ResponseSizes,
}

impl BulkResponse {
    pub fn from_raw(raw: RawBulkResponse, transport: &RawResponse) -> BulkResponse {
        let bulk_errors = raw
            .results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.rowcount == BULK_ERROR_ROWCOUNT)
            .map(|(i, _)| i)
            .collect();
        BulkResponse {
            cols: raw.cols,
            duration: raw.duration,
            results: raw.results,
            bulk_errors,
            durations: ResponseDurations::from_transport(transport.durations.request_ms, raw.duration),
            sizes: transport.sizes.into(),
        }
    }

    /// True if any sub-operation reported an error (either the `-2`
    /// sentinel rowcount or a structured per-row error body).
    pub fn has_errors(&self) -> bool {
        !self.bulk_errors.is_empty() || self.results.iter().any(|r| r.error.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_query_response_parses_minimal_envelope() {
        let json = serde_json::json!({
            "cols": ["id", "name"],
            "col_types": [10, 4],
            "rows": [[1, "a"], [2, "b"]],
            "rowcount": 2,
            "duration": 0.42
        });
        let raw: RawQueryResponse = serde_json::from_value(json).unwrap();
        assert_eq!(raw.cols, vec!["id", "name"]);
        assert_eq!(raw.rowcount, 2);
    }

    #[test]
    fn reshape_row_object_mode_keys_by_column_name() {
        let response = QueryResponse {
            cols: vec!["id".to_string(), "name".to_string()],
            col_types: vec![ColTypeEntry::Scalar(10), ColTypeEntry::Scalar(4)],
            rows: vec![],
            rowcount: 0,
            duration: 0.0,
            durations: ResponseDurations::default(),
            sizes: ResponseSizes::default(),
        };
        let row = vec![CellValue::Json(serde_json::json!(1)), CellValue::Json(serde_json::json!("a"))];
        let shaped = response.reshape_row(&row, RowMode::Object);
        assert_eq!(shaped, serde_json::json!({"id": 1, "name": "a"}));
    }

    #[test]
    fn bulk_response_derives_error_indices() {
        let raw = RawBulkResponse {
            cols: vec![],
            duration: 0.0,
            results: vec![
                BulkResult { rowcount: 1, error: None },
                BulkResult {
                    rowcount: -2,
                    error: Some(BulkError { message: "duplicate key".to_string(), code: Some(4091) }),
                },
                BulkResult { rowcount: 1, error: None },
            ],
        };
        let transport = RawResponse {
            body: serde_json::Value::Null,
            durations: Default::default(),
            sizes: Default::default(),
        };
        let decoded = BulkResponse::from_raw(raw, &transport);
        assert!(decoded.has_errors());
        assert_eq!(decoded.bulk_errors, vec![1]);
    }

    #[test]
    fn query_response_durations_split_server_time_from_transport_time() {
        let durations = ResponseDurations::from_transport(120.0, 20.0);
        assert_eq!(durations.cratedb_ms, 20.0);
        assert_eq!(durations.request_ms, 100.0);
    }
}

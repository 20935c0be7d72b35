//! Request encoding and response decoding for the `/_sql` endpoint.
//!
//! Encoding turns caller-supplied [`SqlArg`] values into the bare JSON the
//! wire protocol expects (dates and timestamps become epoch milliseconds,
//! bytes become base64 text). Decoding is the inverse: given `col_types`
//! from the response envelope, each cell is converted into the
//! [`CellValue`] the active [`DeserializationConfig`] asks for.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::coltype::{ColTypeEntry, ColumnType};
use crate::config::{DeserializationConfig, LongPolicy, TemporalPolicy};
use crate::error::{Error, Result};
use crate::value::{self, CellValue};

/// One positional `?` argument bound to a statement.
///
/// Mirrors the shape of [`crate::coltype::ColumnType`]: a small closed set
/// of scalars plus an escape hatch (`Json`) for anything already shaped
/// the way the wire protocol wants it.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    Null,
    I64(i64),
    F64(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    Date(time::Date),
    Timestamp(time::OffsetDateTime),
    Array(Vec<SqlArg>),
    /// A set-like collection. Encodes identically to [`SqlArg::Array`] —
    /// a bare JSON array — but is kept as its own variant so callers can
    /// express "this is a set" without losing that intent on the way in.
    Set(Vec<SqlArg>),
    /// An ordered key/value map, emitted as a JSON object whose key order
    /// matches insertion order (`serde_json`'s `preserve_order` feature
    /// keeps that guarantee all the way to the wire).
    Map(Vec<(String, SqlArg)>),
    Json(serde_json::Value),
}

macro_rules! impl_from_for_sqlarg {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for SqlArg {
            fn from(value: $ty) -> Self {
                SqlArg::$variant(value)
            }
        }
    };
}

impl_from_for_sqlarg!(I64, i64);
impl_from_for_sqlarg!(F64, f64);
impl_from_for_sqlarg!(Bool, bool);
impl_from_for_sqlarg!(Str, String);
impl_from_for_sqlarg!(Bytes, Vec<u8>);
impl_from_for_sqlarg!(Date, time::Date);
impl_from_for_sqlarg!(Timestamp, time::OffsetDateTime);
impl_from_for_sqlarg!(Json, serde_json::Value);

impl From<&str> for SqlArg {
    fn from(value: &str) -> Self {
        SqlArg::Str(value.to_string())
    }
}

impl From<i32> for SqlArg {
    fn from(value: i32) -> Self {
        SqlArg::I64(i64::from(value))
    }
}

impl<T: Into<SqlArg>> From<Option<T>> for SqlArg {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => SqlArg::Null,
        }
    }
}

impl<T: Into<SqlArg>> From<Vec<T>> for SqlArg {
    fn from(values: Vec<T>) -> Self {
        SqlArg::Array(values.into_iter().map(Into::into).collect())
    }
}

impl SqlArg {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SqlArg::Null => serde_json::Value::Null,
            SqlArg::I64(n) => serde_json::Value::from(*n),
            SqlArg::F64(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            SqlArg::Bool(b) => serde_json::Value::from(*b),
            SqlArg::Str(s) => serde_json::Value::from(s.clone()),
            SqlArg::Bytes(b) => serde_json::Value::from(BASE64.encode(b)),
            SqlArg::Date(d) => serde_json::Value::from(epoch_millis_from_date(*d)),
            SqlArg::Timestamp(ts) => {
                serde_json::Value::from(ts.unix_timestamp() * 1000 + i64::from(ts.millisecond()))
            }
            SqlArg::Array(items) | SqlArg::Set(items) => {
                serde_json::Value::Array(items.iter().map(SqlArg::to_json).collect())
            }
            SqlArg::Map(entries) => {
                let mut obj = serde_json::Map::with_capacity(entries.len());
                for (key, value) in entries {
                    obj.insert(key.clone(), value.to_json());
                }
                serde_json::Value::Object(obj)
            }
            SqlArg::Json(v) => v.clone(),
        }
    }
}

fn epoch_millis_from_date(date: time::Date) -> i64 {
    date.midnight().assume_utc().unix_timestamp() * 1000
}

/// Request body for a single statement: `{"stmt": ..., "args": [...]}`.
pub fn encode(sql: &str, args: &[SqlArg]) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    body.insert("stmt".to_string(), serde_json::Value::from(sql));
    if !args.is_empty() {
        body.insert(
            "args".to_string(),
            serde_json::Value::Array(args.iter().map(SqlArg::to_json).collect()),
        );
    }
    serde_json::Value::Object(body)
}

/// Request body for a batched statement: `{"stmt": ..., "bulk_args": [[...], ...]}`.
pub fn encode_bulk(sql: &str, bulk_args: &[Vec<SqlArg>]) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    body.insert("stmt".to_string(), serde_json::Value::from(sql));
    body.insert(
        "bulk_args".to_string(),
        serde_json::Value::Array(
            bulk_args
                .iter()
                .map(|row| serde_json::Value::Array(row.iter().map(SqlArg::to_json).collect()))
                .collect(),
        ),
    );
    serde_json::Value::Object(body)
}

/// Decode one row using the column types from the response envelope.
pub fn decode_row(
    row: &[serde_json::Value],
    col_types: &[ColTypeEntry],
    config: &DeserializationConfig,
) -> Result<Vec<CellValue>> {
    if row.len() != col_types.len() {
        return Err(Error::DeserializationError(format!(
            "row has {} cells but {} column types were reported",
            row.len(),
            col_types.len()
        )));
    }
    row.iter()
        .zip(col_types)
        .map(|(value, entry)| decode_cell(value, entry, config))
        .collect()
}

fn decode_cell(
    value: &serde_json::Value,
    entry: &ColTypeEntry,
    config: &DeserializationConfig,
) -> Result<CellValue> {
    if value.is_null() {
        return Ok(CellValue::Json(serde_json::Value::Null));
    }
    match entry {
        ColTypeEntry::Array(inner) => match value {
            serde_json::Value::Array(items) => {
                let decoded = items
                    .iter()
                    .map(|item| decode_cell(item, inner, config))
                    .collect::<Result<Vec<_>>>()?;
                Ok(CellValue::Array(decoded))
            }
            other => Err(Error::DeserializationError(format!(
                "expected a JSON array for an ARRAY column, got {other}"
            ))),
        },
        ColTypeEntry::Scalar(tag) => decode_scalar(value, ColumnType::from_tag(*tag), config),
    }
}

fn decode_scalar(
    value: &serde_json::Value,
    ty: ColumnType,
    config: &DeserializationConfig,
) -> Result<CellValue> {
    if ty.is_bigint() {
        return match config.long {
            LongPolicy::Number => Ok(CellValue::Json(value.clone())),
            LongPolicy::BigInt => Ok(CellValue::Long(value::epoch_millis_from_value(value)?)),
        };
    }
    if ty.is_date() {
        return match config.date {
            TemporalPolicy::Number => Ok(CellValue::Json(value.clone())),
            TemporalPolicy::Date => {
                let millis = value::epoch_millis_from_value(value)?;
                Ok(CellValue::Date(value::date_from_epoch_millis(millis)?))
            }
        };
    }
    if ty.is_timestamp() {
        return match config.timestamp {
            TemporalPolicy::Number => Ok(CellValue::Json(value.clone())),
            TemporalPolicy::Date => {
                let millis = value::epoch_millis_from_value(value)?;
                Ok(CellValue::Timestamp(value::timestamp_from_epoch_millis(
                    millis,
                )?))
            }
        };
    }
    Ok(CellValue::Json(value.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn encode_omits_args_when_empty() {
        let body = encode("select 1", &[]);
        assert_eq!(body, serde_json::json!({"stmt": "select 1"}));
    }

    #[test]
    fn encode_serializes_each_arg_kind() {
        let args = vec![
            SqlArg::I64(42),
            SqlArg::Str("hi".to_string()),
            SqlArg::Date(date!(2024 - 01 - 01)),
            SqlArg::Bytes(vec![1, 2, 3]),
            SqlArg::Null,
        ];
        let body = encode("insert into t values (?, ?, ?, ?, ?)", &args);
        assert_eq!(
            body["args"],
            serde_json::json!([42, "hi", 1704067200000i64, "AQID", null])
        );
    }

    #[test]
    fn encode_map_preserves_insertion_order() {
        let arg = SqlArg::Map(vec![
            ("z".to_string(), SqlArg::I64(1)),
            ("a".to_string(), SqlArg::I64(2)),
        ]);
        let json = arg.to_json();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn encode_set_emits_a_bare_json_array() {
        let arg = SqlArg::Set(vec![SqlArg::I64(1), SqlArg::I64(2)]);
        assert_eq!(arg.to_json(), serde_json::json!([1, 2]));
    }

    #[test]
    fn encode_bulk_nests_each_row() {
        let bulk = vec![
            vec![SqlArg::I64(1), SqlArg::Str("a".to_string())],
            vec![SqlArg::I64(2), SqlArg::Str("b".to_string())],
        ];
        let body = encode_bulk("insert into t values (?, ?)", &bulk);
        assert_eq!(
            body["bulk_args"],
            serde_json::json!([[1, "a"], [2, "b"]])
        );
    }

    #[test]
    fn decode_bigint_respects_policy() {
        let entry = ColTypeEntry::Scalar(10);
        let value = serde_json::json!(9223372036854775000i64);

        let as_number = DeserializationConfig {
            long: LongPolicy::Number,
            ..Default::default()
        };
        assert_eq!(
            decode_cell(&value, &entry, &as_number).unwrap(),
            CellValue::Json(value.clone())
        );

        let as_bigint = DeserializationConfig {
            long: LongPolicy::BigInt,
            ..Default::default()
        };
        assert_eq!(
            decode_cell(&value, &entry, &as_bigint).unwrap(),
            CellValue::Long(9223372036854775000i64)
        );
    }

    #[test]
    fn decode_timestamp_defaults_to_date_variant() {
        let entry = ColTypeEntry::Scalar(11);
        let expected = datetime!(2024-01-01 00:00:00 UTC);
        let millis = expected.unix_timestamp() * 1000;
        let value = serde_json::json!(millis);
        let config = DeserializationConfig::default();
        assert_eq!(
            decode_cell(&value, &entry, &config).unwrap(),
            CellValue::Timestamp(expected)
        );
    }

    #[test]
    fn decode_array_column_recurses_into_elements() {
        let entry = ColTypeEntry::Array(Box::new(ColTypeEntry::Scalar(10)));
        let value = serde_json::json!([1, 2, 3]);
        let config = DeserializationConfig {
            long: LongPolicy::BigInt,
            ..Default::default()
        };
        let decoded = decode_cell(&value, &entry, &config).unwrap();
        assert_eq!(
            decoded,
            CellValue::Array(vec![
                CellValue::Long(1),
                CellValue::Long(2),
                CellValue::Long(3),
            ])
        );
    }

    #[test]
    fn decode_null_short_circuits_regardless_of_type() {
        let entry = ColTypeEntry::Scalar(11);
        let config = DeserializationConfig::default();
        assert_eq!(
            decode_cell(&serde_json::Value::Null, &entry, &config).unwrap(),
            CellValue::Json(serde_json::Value::Null)
        );
    }

    #[test]
    fn decode_row_rejects_length_mismatch() {
        let row = vec![serde_json::json!(1)];
        let types = vec![ColTypeEntry::Scalar(10), ColTypeEntry::Scalar(4)];
        let config = DeserializationConfig::default();
        assert!(decode_row(&row, &types, &config).is_err());
    }
}

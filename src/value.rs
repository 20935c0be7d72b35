//! Typed cell values produced by [`crate::serializer::decode`].
//!
//! Everything that doesn't need special handling passes through as plain
//! `serde_json::Value`. [`ColumnType::BigInt`], [`ColumnType::Date`] and the
//! two timestamp types get a dedicated variant so callers don't have to
//! re-derive them from a raw JSON number by hand.

use time::{Date, OffsetDateTime};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Json(serde_json::Value),
    Long(i64),
    Date(Date),
    Timestamp(OffsetDateTime),
    Array(Vec<CellValue>),
}

impl CellValue {
    /// Render back to a plain `serde_json::Value`, e.g. for callers that
    /// don't care about the typed wrappers and just want JSON.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            CellValue::Json(v) => v,
            CellValue::Long(n) => serde_json::Value::from(n),
            CellValue::Date(d) => serde_json::Value::from(epoch_millis_from_date(d)),
            CellValue::Timestamp(ts) => {
                serde_json::Value::from(ts.unix_timestamp() * 1000 + i64::from(ts.millisecond()))
            }
            CellValue::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(CellValue::into_json).collect())
            }
        }
    }
}

/// Parse a raw JSON number literal, preserving full 64-bit precision.
///
/// With `serde_json`'s `arbitrary_precision` feature the lexeme itself is
/// retained on `Number`, so `to_string()` reproduces the original digits
/// exactly — no precision is lost going through `as_i64`/`as_f64` for
/// values that are in range. This function classifies the literal the way
/// a reviver would: integers (no `.`/`e`) stay exact, everything else
/// falls back to `f64`.
pub fn long_from_number(number: &serde_json::Number) -> Result<i64> {
    let lexeme = number.to_string();
    if lexeme.contains('.') || lexeme.contains('e') || lexeme.contains('E') {
        return Err(Error::DeserializationError(format!(
            "expected an integral BIGINT literal, got {lexeme}"
        )));
    }
    lexeme.parse::<i64>().map_err(|_| {
        Error::DeserializationError(format!("BIGINT literal out of i64 range: {lexeme}"))
    })
}

pub fn epoch_millis_from_value(value: &serde_json::Value) -> Result<i64> {
    match value {
        serde_json::Value::Number(n) => long_from_number(n),
        other => Err(Error::DeserializationError(format!(
            "expected epoch-millisecond integer, got {other}"
        ))),
    }
}

pub fn date_from_epoch_millis(millis: i64) -> Result<Date> {
    let ts = OffsetDateTime::from_unix_timestamp(millis.div_euclid(1000))
        .map_err(|e| Error::DeserializationError(e.to_string()))?;
    Ok(ts.date())
}

pub fn timestamp_from_epoch_millis(millis: i64) -> Result<OffsetDateTime> {
    let nanos = i128::from(millis) * 1_000_000;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|e| Error::DeserializationError(e.to_string()))
}

fn epoch_millis_from_date(date: Date) -> i64 {
    let midnight = date.midnight().assume_utc();
    midnight.unix_timestamp() * 1000
}

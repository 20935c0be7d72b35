//! The closed set of numeric type tags CrateDB reports in `col_types`.
//!
//! Composite types come back as nested arrays, e.g. an `ARRAY(BIGINT)`
//! column is tagged `[100, 5]` (`ARRAY` wrapping `BIGINT`). [`base_type`]
//! recurses through any such nesting to the innermost scalar tag.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Null,
    NotSupported,
    Char,
    Boolean,
    Text,
    Ip,
    Double,
    Real,
    SmallInt,
    Integer,
    BigInt,
    TimestampWithTz,
    Object,
    GeoPoint,
    GeoShape,
    TimestampWithoutTz,
    UnchekedObject,
    Date,
    RegProc,
    Time,
    OidVector,
    RegClass,
    JsonType,
    Char1,
    RegProc2,
    Unknown(i64),
}

const ARRAY_TAG: i64 = 100;

impl ColumnType {
    pub fn from_tag(tag: i64) -> ColumnType {
        match tag {
            0 => ColumnType::Null,
            1 => ColumnType::NotSupported,
            2 => ColumnType::Char,
            3 => ColumnType::Boolean,
            4 => ColumnType::Text,
            5 => ColumnType::Ip,
            6 => ColumnType::Double,
            7 => ColumnType::Real,
            8 => ColumnType::SmallInt,
            9 => ColumnType::Integer,
            10 => ColumnType::BigInt,
            11 => ColumnType::TimestampWithTz,
            12 => ColumnType::Object,
            13 => ColumnType::GeoPoint,
            14 => ColumnType::GeoShape,
            15 => ColumnType::TimestampWithoutTz,
            16 => ColumnType::UnchekedObject,
            17 => ColumnType::Date,
            19 => ColumnType::RegProc,
            20 => ColumnType::Time,
            21 => ColumnType::OidVector,
            22 => ColumnType::RegClass,
            23 => ColumnType::JsonType,
            24 => ColumnType::Char1,
            25 => ColumnType::RegProc2,
            other => ColumnType::Unknown(other),
        }
    }

    pub fn is_bigint(&self) -> bool {
        matches!(self, ColumnType::BigInt)
    }

    pub fn is_date(&self) -> bool {
        matches!(self, ColumnType::Date)
    }

    pub fn is_timestamp(&self) -> bool {
        matches!(
            self,
            ColumnType::TimestampWithTz | ColumnType::TimestampWithoutTz
        )
    }
}

/// One entry of `col_types`: either a bare tag, or a tag nested inside one
/// or more `ARRAY` wrappers (`[100, [100, T]]` for `ARRAY(ARRAY(T))`).
#[derive(Debug, Clone, PartialEq)]
pub enum ColTypeEntry {
    Scalar(i64),
    Array(Box<ColTypeEntry>),
}

impl Serialize for ColTypeEntry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            ColTypeEntry::Scalar(tag) => serializer.serialize_i64(*tag),
            ColTypeEntry::Array(inner) => {
                use serde::ser::SerializeSeq;
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&ARRAY_TAG)?;
                seq.serialize_element(inner.as_ref())?;
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ColTypeEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(ColTypeEntry::from_json(&value))
    }
}

impl ColTypeEntry {
    pub fn from_json(value: &serde_json::Value) -> ColTypeEntry {
        match value {
            serde_json::Value::Array(items) if items.len() == 2 => {
                ColTypeEntry::Array(Box::new(ColTypeEntry::from_json(&items[1])))
            }
            other => {
                let tag = other.as_i64().unwrap_or(0);
                ColTypeEntry::Scalar(tag)
            }
        }
    }

    /// Unwrap any `ARRAY` nesting and return the innermost scalar type.
    pub fn base_type(&self) -> ColumnType {
        match self {
            ColTypeEntry::Scalar(tag) => ColumnType::from_tag(*tag),
            ColTypeEntry::Array(inner) => inner.base_type(),
        }
    }

    /// True if this entry is wrapped in at least one `ARRAY`.
    pub fn is_array(&self) -> bool {
        matches!(self, ColTypeEntry::Array(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_tag_maps_directly() {
        let entry = ColTypeEntry::Scalar(10);
        assert_eq!(entry.base_type(), ColumnType::BigInt);
        assert!(!entry.is_array());
    }

    #[test]
    fn nested_array_unwraps_to_innermost_scalar() {
        let entry = ColTypeEntry::Array(Box::new(ColTypeEntry::Array(Box::new(
            ColTypeEntry::Scalar(11),
        ))));
        assert_eq!(entry.base_type(), ColumnType::TimestampWithTz);
        assert!(entry.is_array());
    }

    #[test]
    fn from_json_round_trips_array_wrapper() {
        let json = serde_json::json!([100, 10]);
        let entry = ColTypeEntry::from_json(&json);
        assert_eq!(entry, ColTypeEntry::Array(Box::new(ColTypeEntry::Scalar(10))));
        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back, json);
    }

    #[test]
    fn unknown_tag_is_preserved() {
        assert_eq!(ColumnType::from_tag(999), ColumnType::Unknown(999));
    }
}

//! Entity converters: decoded source documents to target rows.
//!
//! Each entity kind has a `*Document` type (the source shape, tolerant of
//! fields older documents never had) and a `*Row` type (the target row).
//! Conversion is pure and total: absent values become documented defaults,
//! never errors. A [`Converter`] binds a collection to a row type for the
//! batch loader; fan-out converters emit several rows per document.

pub mod api_key;
pub mod device;
pub mod namespace;
pub mod public_key;
pub mod session;
pub mod system;
pub mod tag;
pub mod user;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::core::{Row, TableDef};
use crate::error::{MigrateError, Result};

/// Seconds from the Unix epoch to `0001-01-01T00:00:00Z`.
const ZERO_TIME_SECS: i64 = -62_135_596_800;

/// The zero instant stored when a source document never recorded a time.
pub fn zero_time() -> DateTime<Utc> {
    DateTime::from_timestamp(ZERO_TIME_SECS, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Use `t`, or the zero instant when absent.
pub fn or_zero(t: Option<DateTime<Utc>>) -> DateTime<Utc> {
    t.unwrap_or_else(zero_time)
}

/// Replace an empty string with `default`.
pub fn or_default(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}

/// A converted row bound to its table.
pub trait TargetRow: Send + 'static {
    const TABLE: &'static TableDef;

    /// Flatten into values, in `TABLE.columns` order.
    fn into_values(self) -> Row;
}

/// Binds a source collection to a target row type.
pub trait Converter: Send + Sync {
    type Document: DeserializeOwned + Send;
    type Row: TargetRow;

    /// Source collection the documents are streamed from.
    const COLLECTION: &'static str;

    /// Convert one document, pushing every row it produces.
    fn convert(&self, doc: Self::Document, out: &mut Vec<Self::Row>);
}

/// Decode a raw document into its entity shape.
pub fn decode<T: DeserializeOwned>(collection: &str, doc: serde_json::Value) -> Result<T> {
    serde_json::from_value(doc).map_err(|e| MigrateError::Decode {
        collection: collection.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_time() {
        assert_eq!(zero_time().to_rfc3339(), "0001-01-01T00:00:00+00:00");
        assert_eq!(or_zero(None), zero_time());
    }

    #[test]
    fn test_or_default() {
        assert_eq!(or_default(String::new(), "pending"), "pending");
        assert_eq!(or_default("accepted".into(), "pending"), "accepted");
    }

    #[test]
    fn test_decode_error_names_collection() {
        let err = decode::<tag::TagDocument>("tags", serde_json::json!({"name": 5})).unwrap_err();
        assert!(err.to_string().contains("tags"));
    }
}

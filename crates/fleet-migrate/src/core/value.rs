//! SQL value types for migrated rows.
//!
//! Every converted entity flattens into a `Row` of [`SqlValue`]s in the column
//! order declared by its table definition. The PostgreSQL target binds them
//! directly as statement parameters; the in-memory target stores them as-is.

use std::error::Error;
use std::fmt;

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use uuid::Uuid;

/// A single row, positionally aligned with a table's column list.
pub type Row = Vec<SqlValue>;

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL of any column type.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 64-bit floating point (double precision).
    F64(f64),

    /// Text data.
    Text(String),

    /// Binary data (bytea).
    Bytes(Vec<u8>),

    /// UUID value.
    Uuid(Uuid),

    /// Timestamp with time zone, always UTC.
    Timestamp(DateTime<Utc>),

    /// Text array (text[]).
    TextArray(Vec<String>),

    /// JSON document (jsonb).
    Json(serde_json::Value),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::I32(v) => write!(f, "{}", v),
            SqlValue::I64(v) => write!(f, "{}", v),
            SqlValue::F64(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{}", v),
            SqlValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            SqlValue::Uuid(v) => write!(f, "{}", v),
            SqlValue::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            SqlValue::TextArray(v) => write!(f, "{{{}}}", v.join(",")),
            SqlValue::Json(v) => write!(f, "{}", v),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql(ty, out),
            SqlValue::I32(v) => v.to_sql(ty, out),
            SqlValue::I64(v) => v.to_sql(ty, out),
            SqlValue::F64(v) => v.to_sql(ty, out),
            SqlValue::Text(v) => v.to_sql(ty, out),
            SqlValue::Bytes(v) => v.to_sql(ty, out),
            SqlValue::Uuid(v) => v.to_sql(ty, out),
            SqlValue::Timestamp(v) => v.to_sql(ty, out),
            SqlValue::TextArray(v) => v.to_sql(ty, out),
            SqlValue::Json(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Column types are fixed by the target schema; each variant checks
        // compatibility when it delegates.
        true
    }

    to_sql_checked!();
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<Vec<String>> for SqlValue {
    fn from(v: Vec<String>) -> Self {
        SqlValue::TextArray(v)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        SqlValue::Json(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_is_null() {
        assert!(SqlValue::Null.is_null());
        assert!(!SqlValue::I32(42).is_null());
    }

    #[test]
    fn test_from_option() {
        let none: Option<String> = None;
        assert_eq!(SqlValue::from(none), SqlValue::Null);
        assert_eq!(
            SqlValue::from(Some("x".to_string())),
            SqlValue::Text("x".into())
        );
    }

    #[test]
    fn test_display_for_reports() {
        assert_eq!(SqlValue::Text("abc".into()).to_string(), "abc");
        assert_eq!(
            SqlValue::TextArray(vec!["a".into(), "b".into()]).to_string(),
            "{a,b}"
        );
        assert_eq!(SqlValue::Null.to_string(), "NULL");
    }

    #[test]
    fn test_to_sql_null_writes_nothing() {
        let mut buf = BytesMut::new();
        let res = SqlValue::Null.to_sql(&Type::TEXT, &mut buf).unwrap();
        assert!(matches!(res, IsNull::Yes));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_to_sql_text() {
        let mut buf = BytesMut::new();
        let res = SqlValue::Text("hi".into())
            .to_sql(&Type::TEXT, &mut buf)
            .unwrap();
        assert!(matches!(res, IsNull::No));
        assert_eq!(&buf[..], b"hi");
    }
}

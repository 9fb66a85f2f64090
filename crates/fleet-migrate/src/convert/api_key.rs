//! API keys.
//!
//! The legacy `_id` is the key's digest; it is kept as `key_digest` and also
//! translated into the row identifier.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{or_zero, Converter, TargetRow};
use crate::core::schema::{self, TableDef};
use crate::core::{Row, SqlValue};
use crate::id;
use crate::source::{collections, extjson};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiKeyDocument {
    #[serde(rename = "_id", deserialize_with = "extjson::id")]
    pub id: String,
    #[serde(deserialize_with = "extjson::string")]
    pub name: String,
    #[serde(deserialize_with = "extjson::id")]
    pub tenant_id: String,
    #[serde(deserialize_with = "extjson::string")]
    pub role: String,
    #[serde(deserialize_with = "extjson::id")]
    pub created_by: String,
    #[serde(deserialize_with = "extjson::int64")]
    pub expires_in: i64,
    #[serde(deserialize_with = "extjson::datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "extjson::datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiKeyRow {
    pub id: Uuid,
    pub namespace_id: Uuid,
    pub key_digest: String,
    pub name: String,
    pub role: String,
    pub created_by: Uuid,
    pub expires_in: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TargetRow for ApiKeyRow {
    const TABLE: &'static TableDef = &schema::API_KEYS;

    fn into_values(self) -> Row {
        vec![
            SqlValue::Uuid(self.id),
            SqlValue::Uuid(self.namespace_id),
            SqlValue::Text(self.key_digest),
            SqlValue::Text(self.name),
            SqlValue::Text(self.role),
            SqlValue::Uuid(self.created_by),
            SqlValue::I64(self.expires_in),
            SqlValue::Timestamp(self.created_at),
            SqlValue::Timestamp(self.updated_at),
        ]
    }
}

pub fn convert(doc: ApiKeyDocument) -> ApiKeyRow {
    ApiKeyRow {
        id: id::translate(&doc.id),
        namespace_id: id::translate(&doc.tenant_id),
        key_digest: doc.id,
        name: doc.name,
        role: doc.role,
        created_by: id::translate(&doc.created_by),
        expires_in: doc.expires_in,
        created_at: or_zero(doc.created_at),
        updated_at: or_zero(doc.updated_at),
    }
}

pub struct ApiKeyConverter;

impl Converter for ApiKeyConverter {
    type Document = ApiKeyDocument;
    type Row = ApiKeyRow;
    const COLLECTION: &'static str = collections::API_KEYS;

    fn convert(&self, doc: ApiKeyDocument, out: &mut Vec<ApiKeyRow>) {
        out.push(convert(doc));
    }
}

//! Tags.

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
pub struct TagDocument {
    #[serde(rename = "_id", deserialize_with = "extjson::id")]
    pub id: String,
    #[serde(deserialize_with = "extjson::id")]
    pub tenant_id: String,
    #[serde(deserialize_with = "extjson::string")]
    pub name: String,
    #[serde(deserialize_with = "extjson::datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "extjson::datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagRow {
    pub id: Uuid,
    pub namespace_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TargetRow for TagRow {
    const TABLE: &'static TableDef = &schema::TAGS;

    fn into_values(self) -> Row {
        vec![
            SqlValue::Uuid(self.id),
            SqlValue::Uuid(self.namespace_id),
            SqlValue::Text(self.name),
            SqlValue::Timestamp(self.created_at),
            SqlValue::Timestamp(self.updated_at),
        ]
    }
}

pub fn convert(doc: TagDocument) -> TagRow {
    TagRow {
        id: id::translate(&doc.id),
        namespace_id: id::translate(&doc.tenant_id),
        name: doc.name,
        created_at: or_zero(doc.created_at),
        updated_at: or_zero(doc.updated_at),
    }
}

pub struct TagConverter;

impl Converter for TagConverter {
    type Document = TagDocument;
    type Row = TagRow;
    const COLLECTION: &'static str = collections::TAGS;

    fn convert(&self, doc: TagDocument, out: &mut Vec<TagRow>) {
        out.push(convert(doc));
    }
}

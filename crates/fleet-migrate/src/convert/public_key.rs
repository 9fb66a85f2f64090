//! Public keys and the tags in their device filter.

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
pub struct PublicKeyDocument {
    #[serde(rename = "_id", deserialize_with = "extjson::id")]
    pub id: String,
    #[serde(deserialize_with = "extjson::string")]
    pub fingerprint: String,
    #[serde(deserialize_with = "extjson::id")]
    pub tenant_id: String,
    #[serde(deserialize_with = "extjson::binary")]
    pub data: Vec<u8>,
    #[serde(deserialize_with = "extjson::string")]
    pub name: String,
    #[serde(deserialize_with = "extjson::string")]
    pub username: String,
    #[serde(deserialize_with = "extjson::or_default")]
    pub filter: PublicKeyFilter,
    #[serde(deserialize_with = "extjson::datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "extjson::datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PublicKeyFilter {
    #[serde(deserialize_with = "extjson::string")]
    pub hostname: String,
    #[serde(deserialize_with = "extjson::id_list")]
    pub tag_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublicKeyRow {
    pub id: Uuid,
    pub namespace_id: Uuid,
    pub fingerprint: String,
    pub name: String,
    pub data: Vec<u8>,
    pub username: String,
    pub filter_hostname: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TargetRow for PublicKeyRow {
    const TABLE: &'static TableDef = &schema::PUBLIC_KEYS;

    fn into_values(self) -> Row {
        vec![
            SqlValue::Uuid(self.id),
            SqlValue::Uuid(self.namespace_id),
            SqlValue::Text(self.fingerprint),
            SqlValue::Text(self.name),
            SqlValue::Bytes(self.data),
            SqlValue::Text(self.username),
            SqlValue::Text(self.filter_hostname),
            SqlValue::Timestamp(self.created_at),
            SqlValue::Timestamp(self.updated_at),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicKeyTagRow {
    pub public_key_id: Uuid,
    pub tag_id: Uuid,
}

impl TargetRow for PublicKeyTagRow {
    const TABLE: &'static TableDef = &schema::PUBLIC_KEY_TAGS;

    fn into_values(self) -> Row {
        vec![SqlValue::Uuid(self.public_key_id), SqlValue::Uuid(self.tag_id)]
    }
}

pub fn convert(doc: PublicKeyDocument) -> PublicKeyRow {
    PublicKeyRow {
        id: id::translate(&doc.id),
        namespace_id: id::translate(&doc.tenant_id),
        fingerprint: doc.fingerprint,
        name: doc.name,
        data: doc.data,
        username: doc.username,
        filter_hostname: doc.filter.hostname,
        created_at: or_zero(doc.created_at),
        updated_at: or_zero(doc.updated_at),
    }
}

/// One join row per tag in the key's device filter.
pub fn convert_tags(doc: &PublicKeyDocument) -> Vec<PublicKeyTagRow> {
    let public_key_id = id::translate(&doc.id);
    doc.filter
        .tag_ids
        .iter()
        .map(|tag| PublicKeyTagRow {
            public_key_id,
            tag_id: id::translate(tag),
        })
        .collect()
}

pub struct PublicKeyConverter;

impl Converter for PublicKeyConverter {
    type Document = PublicKeyDocument;
    type Row = PublicKeyRow;
    const COLLECTION: &'static str = collections::PUBLIC_KEYS;

    fn convert(&self, doc: PublicKeyDocument, out: &mut Vec<PublicKeyRow>) {
        out.push(convert(doc));
    }
}

pub struct PublicKeyTagConverter;

impl Converter for PublicKeyTagConverter {
    type Document = PublicKeyDocument;
    type Row = PublicKeyTagRow;
    const COLLECTION: &'static str = collections::PUBLIC_KEYS;

    fn convert(&self, doc: PublicKeyDocument, out: &mut Vec<PublicKeyTagRow>) {
        out.extend(convert_tags(&doc));
    }
}

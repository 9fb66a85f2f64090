//! Namespaces and their memberships.
//!
//! A namespace document embeds its member list; the member list fans out
//! into one membership row per member.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{or_default, or_zero, zero_time, Converter, TargetRow};
use crate::core::schema::{self, TableDef};
use crate::core::{Row, SqlValue};
use crate::id;
use crate::source::{collections, extjson};

pub const DEFAULT_NAMESPACE_TYPE: &str = "personal";
pub const DEFAULT_MEMBER_ROLE: &str = "observer";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NamespaceDocument {
    #[serde(deserialize_with = "extjson::string")]
    pub name: String,
    #[serde(deserialize_with = "extjson::id")]
    pub owner: String,
    #[serde(deserialize_with = "extjson::id")]
    pub tenant_id: String,
    #[serde(rename = "type", deserialize_with = "extjson::string")]
    pub kind: String,
    #[serde(deserialize_with = "extjson::or_default")]
    pub members: Vec<MemberDocument>,
    #[serde(deserialize_with = "extjson::or_default")]
    pub settings: NamespaceSettings,
    #[serde(deserialize_with = "extjson::int64")]
    pub max_devices: i64,
    #[serde(deserialize_with = "extjson::int64")]
    pub devices_accepted_count: i64,
    #[serde(deserialize_with = "extjson::int64")]
    pub devices_pending_count: i64,
    #[serde(deserialize_with = "extjson::int64")]
    pub devices_rejected_count: i64,
    #[serde(deserialize_with = "extjson::int64")]
    pub devices_removed_count: i64,
    #[serde(deserialize_with = "extjson::datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "extjson::datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MemberDocument {
    #[serde(deserialize_with = "extjson::id")]
    pub id: String,
    #[serde(deserialize_with = "extjson::string")]
    pub role: String,
    #[serde(deserialize_with = "extjson::string")]
    pub status: String,
    #[serde(deserialize_with = "extjson::datetime")]
    pub added_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NamespaceSettings {
    pub session_record: bool,
    #[serde(deserialize_with = "extjson::string")]
    pub connection_announcement: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceRow {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub owner_id: Uuid,
    pub kind: String,
    pub max_devices: i64,
    pub devices_accepted_count: i64,
    pub devices_pending_count: i64,
    pub devices_rejected_count: i64,
    pub devices_removed_count: i64,
    pub session_record: bool,
    pub connection_announcement: String,
}

impl TargetRow for NamespaceRow {
    const TABLE: &'static TableDef = &schema::NAMESPACES;

    fn into_values(self) -> Row {
        vec![
            SqlValue::Uuid(self.id),
            SqlValue::Timestamp(self.created_at),
            SqlValue::Timestamp(self.updated_at),
            SqlValue::Text(self.name),
            SqlValue::Uuid(self.owner_id),
            SqlValue::Text(self.kind),
            SqlValue::I64(self.max_devices),
            SqlValue::I64(self.devices_accepted_count),
            SqlValue::I64(self.devices_pending_count),
            SqlValue::I64(self.devices_rejected_count),
            SqlValue::I64(self.devices_removed_count),
            SqlValue::Bool(self.session_record),
            SqlValue::Text(self.connection_announcement),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MembershipRow {
    pub namespace_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TargetRow for MembershipRow {
    const TABLE: &'static TableDef = &schema::MEMBERSHIPS;

    fn into_values(self) -> Row {
        vec![
            SqlValue::Uuid(self.namespace_id),
            SqlValue::Uuid(self.user_id),
            SqlValue::Text(self.role),
            SqlValue::Text(self.status),
            SqlValue::Timestamp(self.created_at),
            SqlValue::Timestamp(self.updated_at),
        ]
    }
}

pub fn convert(doc: NamespaceDocument) -> NamespaceRow {
    NamespaceRow {
        id: id::translate(&doc.tenant_id),
        created_at: or_zero(doc.created_at),
        updated_at: or_zero(doc.updated_at),
        name: doc.name,
        owner_id: id::translate(&doc.owner),
        kind: or_default(doc.kind, DEFAULT_NAMESPACE_TYPE),
        max_devices: doc.max_devices,
        devices_accepted_count: doc.devices_accepted_count,
        devices_pending_count: doc.devices_pending_count,
        devices_rejected_count: doc.devices_rejected_count,
        devices_removed_count: doc.devices_removed_count,
        session_record: doc.settings.session_record,
        connection_announcement: doc.settings.connection_announcement,
    }
}

/// One membership row per embedded member.
pub fn convert_members(doc: &NamespaceDocument) -> Vec<MembershipRow> {
    let namespace_id = id::translate(&doc.tenant_id);
    doc.members
        .iter()
        .map(|member| MembershipRow {
            namespace_id,
            user_id: id::translate(&member.id),
            role: or_default(member.role.clone(), DEFAULT_MEMBER_ROLE),
            status: member.status.clone(),
            created_at: or_zero(member.added_at),
            updated_at: zero_time(),
        })
        .collect()
}

pub struct NamespaceConverter;

impl Converter for NamespaceConverter {
    type Document = NamespaceDocument;
    type Row = NamespaceRow;
    const COLLECTION: &'static str = collections::NAMESPACES;

    fn convert(&self, doc: NamespaceDocument, out: &mut Vec<NamespaceRow>) {
        out.push(convert(doc));
    }
}

pub struct MembershipConverter;

impl Converter for MembershipConverter {
    type Document = NamespaceDocument;
    type Row = MembershipRow;
    const COLLECTION: &'static str = collections::NAMESPACES;

    fn convert(&self, doc: NamespaceDocument, out: &mut Vec<MembershipRow>) {
        out.extend(convert_members(&doc));
    }
}

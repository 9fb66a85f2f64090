//! Sessions and session events.
//!
//! Whether a session is still open lives in a separate `active_sessions`
//! collection; the session job loads those UIDs first and hands them to the
//! converter.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{or_default, or_zero, Converter, TargetRow};
use crate::core::schema::{self, TableDef};
use crate::core::{Row, SqlValue};
use crate::id;
use crate::source::{collections, extjson};

pub const DEFAULT_SESSION_TYPE: &str = "shell";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionDocument {
    #[serde(deserialize_with = "extjson::id")]
    pub uid: String,
    #[serde(deserialize_with = "extjson::id")]
    pub device_uid: String,
    #[serde(deserialize_with = "extjson::id")]
    pub tenant_id: String,
    #[serde(deserialize_with = "extjson::string")]
    pub username: String,
    #[serde(deserialize_with = "extjson::string")]
    pub ip_address: String,
    pub authenticated: bool,
    pub recorded: bool,
    #[serde(rename = "type", deserialize_with = "extjson::string")]
    pub kind: String,
    #[serde(deserialize_with = "extjson::string")]
    pub term: String,
    #[serde(deserialize_with = "extjson::or_default")]
    pub position: SessionPosition,
    #[serde(deserialize_with = "extjson::datetime")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "extjson::datetime")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "extjson::datetime")]
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionPosition {
    #[serde(deserialize_with = "extjson::double")]
    pub latitude: f64,
    #[serde(deserialize_with = "extjson::double")]
    pub longitude: f64,
}

/// Entry of the `active_sessions` collection.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ActiveSessionDocument {
    #[serde(deserialize_with = "extjson::id")]
    pub uid: String,
    #[serde(deserialize_with = "extjson::datetime")]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionEventDocument {
    #[serde(rename = "_id", deserialize_with = "extjson::id")]
    pub id: String,
    #[serde(deserialize_with = "extjson::id")]
    pub session: String,
    #[serde(rename = "type", deserialize_with = "extjson::string")]
    pub kind: String,
    #[serde(deserialize_with = "extjson::int64")]
    pub seat: i64,
    pub data: Option<serde_json::Value>,
    #[serde(deserialize_with = "extjson::datetime")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRow {
    pub id: Uuid,
    pub device_id: Uuid,
    pub namespace_id: Uuid,
    pub username: String,
    pub ip_address: String,
    pub authenticated: bool,
    pub active: bool,
    pub recorded: bool,
    pub kind: String,
    pub term: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl TargetRow for SessionRow {
    const TABLE: &'static TableDef = &schema::SESSIONS;

    fn into_values(self) -> Row {
        vec![
            SqlValue::Uuid(self.id),
            SqlValue::Uuid(self.device_id),
            SqlValue::Uuid(self.namespace_id),
            SqlValue::Text(self.username),
            SqlValue::Text(self.ip_address),
            SqlValue::Bool(self.authenticated),
            SqlValue::Bool(self.active),
            SqlValue::Bool(self.recorded),
            SqlValue::Text(self.kind),
            SqlValue::Text(self.term),
            SqlValue::F64(self.latitude),
            SqlValue::F64(self.longitude),
            SqlValue::Timestamp(self.created_at),
            SqlValue::Timestamp(self.updated_at),
            self.closed_at.into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionEventRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub kind: String,
    pub seat: i64,
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl TargetRow for SessionEventRow {
    const TABLE: &'static TableDef = &schema::SESSION_EVENTS;

    fn into_values(self) -> Row {
        vec![
            SqlValue::Uuid(self.id),
            SqlValue::Uuid(self.session_id),
            SqlValue::Text(self.kind),
            SqlValue::I64(self.seat),
            self.data.into(),
            SqlValue::Timestamp(self.created_at),
        ]
    }
}

/// Convert a session; `active` says whether it appears in `active_sessions`.
pub fn convert(doc: SessionDocument, active: bool) -> SessionRow {
    SessionRow {
        id: id::translate(&doc.uid),
        device_id: id::translate(&doc.device_uid),
        namespace_id: id::translate(&doc.tenant_id),
        username: doc.username,
        ip_address: doc.ip_address,
        authenticated: doc.authenticated,
        active,
        recorded: doc.recorded,
        kind: or_default(doc.kind, DEFAULT_SESSION_TYPE),
        term: doc.term,
        latitude: doc.position.latitude,
        longitude: doc.position.longitude,
        created_at: or_zero(doc.started_at),
        updated_at: or_zero(doc.last_seen),
        closed_at: doc.closed_at,
    }
}

pub fn convert_event(doc: SessionEventDocument) -> SessionEventRow {
    SessionEventRow {
        id: id::translate(&doc.id),
        session_id: id::translate(&doc.session),
        kind: doc.kind,
        seat: doc.seat,
        data: doc.data.filter(|v| !v.is_null()),
        created_at: or_zero(doc.timestamp),
    }
}

/// Session converter holding the UIDs of currently active sessions.
#[derive(Debug, Default)]
pub struct SessionConverter {
    active: HashSet<String>,
}

impl SessionConverter {
    pub fn new(active: HashSet<String>) -> Self {
        Self { active }
    }
}

impl Converter for SessionConverter {
    type Document = SessionDocument;
    type Row = SessionRow;
    const COLLECTION: &'static str = collections::SESSIONS;

    fn convert(&self, doc: SessionDocument, out: &mut Vec<SessionRow>) {
        let active = self.active.contains(&doc.uid);
        out.push(convert(doc, active));
    }
}

pub struct SessionEventConverter;

impl Converter for SessionEventConverter {
    type Document = SessionEventDocument;
    type Row = SessionEventRow;
    const COLLECTION: &'static str = collections::SESSIONS_EVENTS;

    fn convert(&self, doc: SessionEventDocument, out: &mut Vec<SessionEventRow>) {
        out.push(convert_event(doc));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{decode, zero_time};
    use serde_json::json;

    #[test]
    fn test_session_defaults_and_active_flag() {
        let doc: SessionDocument = decode(
            "sessions",
            json!({"uid": "s1", "device_uid": "d1", "tenant_id": "t", "type": ""}),
        )
        .unwrap();
        let converter = SessionConverter::new(HashSet::from(["s1".to_string()]));
        let mut out = Vec::new();
        converter.convert(doc.clone(), &mut out);
        let row = out.remove(0);
        assert_eq!(row.kind, "shell");
        assert!(row.active);
        assert_eq!(row.device_id, id::translate("d1"));
        assert_eq!(row.created_at, zero_time());

        SessionConverter::default().convert(doc, &mut out);
        assert!(!out[0].active);
    }

    #[test]
    fn test_explicit_session_type_kept() {
        let doc: SessionDocument =
            decode("sessions", json!({"uid": "s2", "type": "exec"})).unwrap();
        let row = convert(doc, false);
        assert_eq!(row.kind, "exec");
        assert_eq!(row.into_values().len(), SessionRow::TABLE.columns.len());
    }

    #[test]
    fn test_session_event() {
        let doc: SessionEventDocument = decode(
            "sessions_events",
            json!({
                "_id": {"$oid": "e1"},
                "session": "s1",
                "type": "pty-output",
                "seat": 0,
                "data": {"output": "ls\r\n"},
                "timestamp": {"$date": {"$numberLong": "1700000000000"}}
            }),
        )
        .unwrap();
        let row = convert_event(doc);
        assert_eq!(row.id, id::translate("e1"));
        assert_eq!(row.session_id, id::translate("s1"));
        assert_eq!(row.data, Some(json!({"output": "ls\r\n"})));
        assert_eq!(row.created_at.timestamp(), 1_700_000_000);
        assert_eq!(row.into_values().len(), SessionEventRow::TABLE.columns.len());
    }

    #[test]
    fn test_event_without_data() {
        let doc: SessionEventDocument =
            decode("sessions_events", json!({"_id": "e2", "session": "s1", "data": null})).unwrap();
        let values = convert_event(doc).into_values();
        assert!(values[4].is_null());
    }
}

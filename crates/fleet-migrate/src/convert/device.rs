//! Devices and their tag links.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{or_default, or_zero, Converter, TargetRow};
use crate::core::schema::{self, TableDef};
use crate::core::{Row, SqlValue};
use crate::id;
use crate::source::{collections, extjson};

pub const DEFAULT_STATUS: &str = "pending";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeviceDocument {
    #[serde(deserialize_with = "extjson::id")]
    pub uid: String,
    #[serde(deserialize_with = "extjson::string")]
    pub name: String,
    #[serde(deserialize_with = "extjson::or_default")]
    pub identity: DeviceIdentity,
    #[serde(deserialize_with = "extjson::or_default")]
    pub info: DeviceInfo,
    #[serde(deserialize_with = "extjson::string")]
    pub public_key: String,
    #[serde(deserialize_with = "extjson::id")]
    pub tenant_id: String,
    #[serde(deserialize_with = "extjson::string")]
    pub status: String,
    #[serde(deserialize_with = "extjson::string")]
    pub remote_addr: String,
    #[serde(deserialize_with = "extjson::or_default")]
    pub position: DevicePosition,
    #[serde(deserialize_with = "extjson::id_list")]
    pub tag_ids: Vec<String>,
    #[serde(deserialize_with = "extjson::datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "extjson::datetime")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "extjson::datetime")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "extjson::datetime")]
    pub disconnected_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "extjson::datetime")]
    pub status_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeviceIdentity {
    #[serde(deserialize_with = "extjson::string")]
    pub mac: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    #[serde(deserialize_with = "extjson::string")]
    pub id: String,
    #[serde(deserialize_with = "extjson::string")]
    pub pretty_name: String,
    #[serde(deserialize_with = "extjson::string")]
    pub version: String,
    #[serde(deserialize_with = "extjson::string")]
    pub arch: String,
    #[serde(deserialize_with = "extjson::string")]
    pub platform: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DevicePosition {
    #[serde(deserialize_with = "extjson::double")]
    pub latitude: f64,
    #[serde(deserialize_with = "extjson::double")]
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRow {
    pub id: Uuid,
    pub namespace_id: Uuid,
    pub name: String,
    pub status: String,
    pub mac: String,
    pub identifier: String,
    pub pretty_name: String,
    pub version: String,
    pub arch: String,
    pub platform: String,
    pub public_key: String,
    pub remote_addr: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub status_updated_at: Option<DateTime<Utc>>,
}

impl TargetRow for DeviceRow {
    const TABLE: &'static TableDef = &schema::DEVICES;

    fn into_values(self) -> Row {
        vec![
            SqlValue::Uuid(self.id),
            SqlValue::Uuid(self.namespace_id),
            SqlValue::Text(self.name),
            SqlValue::Text(self.status),
            SqlValue::Text(self.mac),
            SqlValue::Text(self.identifier),
            SqlValue::Text(self.pretty_name),
            SqlValue::Text(self.version),
            SqlValue::Text(self.arch),
            SqlValue::Text(self.platform),
            SqlValue::Text(self.public_key),
            SqlValue::Text(self.remote_addr),
            SqlValue::F64(self.latitude),
            SqlValue::F64(self.longitude),
            SqlValue::Timestamp(self.created_at),
            SqlValue::Timestamp(self.updated_at),
            self.last_seen.into(),
            self.disconnected_at.into(),
            self.status_updated_at.into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceTagRow {
    pub device_id: Uuid,
    pub tag_id: Uuid,
}

impl TargetRow for DeviceTagRow {
    const TABLE: &'static TableDef = &schema::DEVICE_TAGS;

    fn into_values(self) -> Row {
        vec![SqlValue::Uuid(self.device_id), SqlValue::Uuid(self.tag_id)]
    }
}

pub fn convert(doc: DeviceDocument) -> DeviceRow {
    DeviceRow {
        id: id::translate(&doc.uid),
        namespace_id: id::translate(&doc.tenant_id),
        name: doc.name,
        status: or_default(doc.status, DEFAULT_STATUS),
        mac: doc.identity.mac,
        identifier: doc.info.id,
        pretty_name: doc.info.pretty_name,
        version: doc.info.version,
        arch: doc.info.arch,
        platform: doc.info.platform,
        public_key: doc.public_key,
        remote_addr: doc.remote_addr,
        latitude: doc.position.latitude,
        longitude: doc.position.longitude,
        created_at: or_zero(doc.created_at),
        updated_at: or_zero(doc.updated_at),
        last_seen: doc.last_seen,
        disconnected_at: doc.disconnected_at,
        status_updated_at: doc.status_updated_at,
    }
}

/// One join row per tag the device carries.
pub fn convert_tags(doc: &DeviceDocument) -> Vec<DeviceTagRow> {
    let device_id = id::translate(&doc.uid);
    doc.tag_ids
        .iter()
        .map(|tag| DeviceTagRow {
            device_id,
            tag_id: id::translate(tag),
        })
        .collect()
}

pub struct DeviceConverter;

impl Converter for DeviceConverter {
    type Document = DeviceDocument;
    type Row = DeviceRow;
    const COLLECTION: &'static str = collections::DEVICES;

    fn convert(&self, doc: DeviceDocument, out: &mut Vec<DeviceRow>) {
        out.push(convert(doc));
    }
}

pub struct DeviceTagConverter;

impl Converter for DeviceTagConverter {
    type Document = DeviceDocument;
    type Row = DeviceTagRow;
    const COLLECTION: &'static str = collections::DEVICES;

    fn convert(&self, doc: DeviceDocument, out: &mut Vec<DeviceTagRow>) {
        out.extend(convert_tags(&doc));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{decode, zero_time};
    use serde_json::json;

    fn bare_device() -> DeviceDocument {
        decode(
            "devices",
            json!({"uid": "d1", "tenant_id": "tenant", "name": "edge-01", "status": ""}),
        )
        .unwrap()
    }

    #[test]
    fn test_bare_device_backfills() {
        let row = convert(bare_device());
        assert_eq!(row.status, "pending");
        assert_eq!(row.mac, "");
        assert_eq!(row.identifier, "");
        assert_eq!(row.latitude, 0.0);
        assert_eq!(row.longitude, 0.0);
        assert_eq!(row.disconnected_at, None);
        assert_eq!(row.created_at, zero_time());
    }

    #[test]
    fn test_bare_device_is_reproducible() {
        let first = convert(bare_device()).into_values();
        let second = convert(bare_device()).into_values();
        assert_eq!(first, second);
        assert_eq!(format!("{:?}", first), format!("{:?}", second));
        assert_eq!(first.len(), DeviceRow::TABLE.columns.len());
    }

    #[test]
    fn test_explicit_status_kept() {
        let doc: DeviceDocument = decode(
            "devices",
            json!({
                "uid": "d2",
                "status": "accepted",
                "identity": {"mac": "aa:bb:cc:dd:ee:ff"},
                "info": {"id": "debian", "arch": "arm64"},
                "position": {"latitude": 52.5, "longitude": {"$numberDouble": "13.4"}},
                "disconnected_at": "2024-02-01T00:00:00Z"
            }),
        )
        .unwrap();
        let row = convert(doc);
        assert_eq!(row.status, "accepted");
        assert_eq!(row.mac, "aa:bb:cc:dd:ee:ff");
        assert_eq!(row.identifier, "debian");
        assert_eq!(row.arch, "arm64");
        assert_eq!(row.latitude, 52.5);
        assert_eq!(row.longitude, 13.4);
        assert!(row.disconnected_at.is_some());
    }

    #[test]
    fn test_tags_fan_out() {
        let doc: DeviceDocument = decode(
            "devices",
            json!({"uid": "d3", "tag_ids": [{"$oid": "t1"}, "t2", "t3"]}),
        )
        .unwrap();
        let rows = convert_tags(&doc);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.device_id == id::translate("d3")));
        assert_eq!(rows[0].tag_id, id::translate("t1"));
        assert_eq!(rows[2].tag_id, id::translate("t3"));
        assert!(convert_tags(&bare_device()).is_empty());
    }
}

//! Spot checks: what a sampled document says each migrated field should be.

use serde_json::Value;
use uuid::Uuid;

use crate::convert::device::{self, DeviceDocument};
use crate::convert::namespace::NamespaceDocument;
use crate::convert::session::{self, SessionDocument};
use crate::convert::tag::TagDocument;
use crate::convert::user::UserDocument;
use crate::convert::{decode, or_default};
use crate::core::SqlValue;
use crate::error::{FieldMismatch, Result};
use crate::id;
use crate::source::collections;

/// Row id and the field values expected under it.
#[derive(Debug, Clone, PartialEq)]
pub struct Expected {
    pub id: Uuid,
    pub fields: Vec<(&'static str, SqlValue)>,
}

impl Expected {
    pub fn columns(&self) -> Vec<&'static str> {
        self.fields.iter().map(|(column, _)| *column).collect()
    }
}

/// A collection/table pair and how to derive expectations from a document.
pub struct SpotSpec {
    pub collection: &'static str,
    pub table: &'static str,
    pub expected: fn(Value) -> Result<Expected>,
}

pub const SPOT_CHECKS: &[SpotSpec] = &[
    SpotSpec {
        collection: collections::USERS,
        table: "users",
        expected: user,
    },
    SpotSpec {
        collection: collections::NAMESPACES,
        table: "namespaces",
        expected: namespace,
    },
    SpotSpec {
        collection: collections::DEVICES,
        table: "devices",
        expected: device,
    },
    SpotSpec {
        collection: collections::TAGS,
        table: "tags",
        expected: tag,
    },
    SpotSpec {
        collection: collections::SESSIONS,
        table: "sessions",
        expected: session,
    },
];

fn user(doc: Value) -> Result<Expected> {
    let doc: UserDocument = decode(collections::USERS, doc)?;
    Ok(Expected {
        id: id::translate(&doc.id),
        fields: vec![
            ("email", SqlValue::Text(doc.email)),
            ("username", SqlValue::Text(doc.username)),
            ("password_digest", SqlValue::Text(doc.password)),
        ],
    })
}

fn namespace(doc: Value) -> Result<Expected> {
    let doc: NamespaceDocument = decode(collections::NAMESPACES, doc)?;
    Ok(Expected {
        id: id::translate(&doc.tenant_id),
        fields: vec![
            ("name", SqlValue::Text(doc.name)),
            ("owner_id", SqlValue::Uuid(id::translate(&doc.owner))),
        ],
    })
}

fn device(doc: Value) -> Result<Expected> {
    let doc: DeviceDocument = decode(collections::DEVICES, doc)?;
    Ok(Expected {
        id: id::translate(&doc.uid),
        fields: vec![
            ("name", SqlValue::Text(doc.name)),
            ("mac", SqlValue::Text(doc.identity.mac)),
            (
                "status",
                SqlValue::Text(or_default(doc.status, device::DEFAULT_STATUS)),
            ),
        ],
    })
}

fn tag(doc: Value) -> Result<Expected> {
    let doc: TagDocument = decode(collections::TAGS, doc)?;
    Ok(Expected {
        id: id::translate(&doc.id),
        fields: vec![
            ("name", SqlValue::Text(doc.name)),
            ("namespace_id", SqlValue::Uuid(id::translate(&doc.tenant_id))),
        ],
    })
}

fn session(doc: Value) -> Result<Expected> {
    let doc: SessionDocument = decode(collections::SESSIONS, doc)?;
    Ok(Expected {
        id: id::translate(&doc.uid),
        fields: vec![
            ("device_id", SqlValue::Uuid(id::translate(&doc.device_uid))),
            (
                "type",
                SqlValue::Text(or_default(doc.kind, session::DEFAULT_SESSION_TYPE)),
            ),
        ],
    })
}

/// Fields of `actual` (in `expected.fields` order) that differ. A column
/// absent from `actual` counts as a mismatch.
pub fn compare(expected: &Expected, actual: &[SqlValue]) -> Vec<FieldMismatch> {
    expected
        .fields
        .iter()
        .enumerate()
        .filter_map(|(idx, (field, want))| match actual.get(idx) {
            Some(got) if got == want => None,
            got => Some(FieldMismatch {
                field: field.to_string(),
                expected: want.to_string(),
                actual: got.map_or_else(|| "missing".to_string(), ToString::to_string),
            }),
        })
        .collect()
}

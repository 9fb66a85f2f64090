//! Users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use uuid::Uuid;

use super::{or_default, or_zero, Converter, TargetRow};
use crate::core::schema::{self, TableDef};
use crate::core::{Row, SqlValue};
use crate::id;
use crate::source::{collections, extjson};

pub const DEFAULT_ORIGIN: &str = "local";
pub const DEFAULT_STATUS: &str = "confirmed";
pub const DEFAULT_AUTH_METHOD: &str = "local";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UserDocument {
    #[serde(rename = "_id", deserialize_with = "extjson::id")]
    pub id: String,
    #[serde(deserialize_with = "extjson::datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "extjson::datetime")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "extjson::datetime")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "extjson::string")]
    pub origin: String,
    #[serde(deserialize_with = "extjson::string")]
    pub external_id: String,
    #[serde(deserialize_with = "extjson::string")]
    pub status: String,
    #[serde(deserialize_with = "extjson::string")]
    pub name: String,
    #[serde(deserialize_with = "extjson::string")]
    pub username: String,
    #[serde(deserialize_with = "extjson::string")]
    pub email: String,
    #[serde(deserialize_with = "extjson::string")]
    pub recovery_email: String,
    #[serde(deserialize_with = "password_digest")]
    pub password: String,
    #[serde(deserialize_with = "extjson::int64")]
    pub max_namespaces: i64,
    pub email_marketing: bool,
    #[serde(deserialize_with = "extjson::or_default")]
    pub preferences: UserPreferences,
    #[serde(deserialize_with = "extjson::or_default")]
    pub mfa: UserMfa,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    #[serde(deserialize_with = "extjson::id")]
    pub preferred_namespace: String,
    #[serde(deserialize_with = "extjson::string_list")]
    pub auth_methods: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UserMfa {
    pub enabled: bool,
}

/// The stored digest is a bare string in older documents and
/// `{"hash": ..}` in newer ones.
fn password_digest<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Object(mut map) => match map.remove("hash") {
            Some(Value::String(s)) => Ok(s),
            _ => Ok(String::new()),
        },
        other => Err(serde::de::Error::custom(format!(
            "expected password digest, got {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub origin: String,
    pub external_id: String,
    pub status: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub recovery_email: String,
    pub password_digest: String,
    pub auth_methods: Vec<String>,
    pub namespace_ownership_limit: i64,
    pub email_marketing: bool,
    pub preferred_namespace_id: Option<Uuid>,
    pub mfa_enabled: bool,
}

impl TargetRow for UserRow {
    const TABLE: &'static TableDef = &schema::USERS;

    fn into_values(self) -> Row {
        vec![
            SqlValue::Uuid(self.id),
            SqlValue::Timestamp(self.created_at),
            SqlValue::Timestamp(self.updated_at),
            self.last_login.into(),
            SqlValue::Text(self.origin),
            SqlValue::Text(self.external_id),
            SqlValue::Text(self.status),
            SqlValue::Text(self.name),
            SqlValue::Text(self.username),
            SqlValue::Text(self.email),
            SqlValue::Text(self.recovery_email),
            SqlValue::Text(self.password_digest),
            SqlValue::TextArray(self.auth_methods),
            SqlValue::I64(self.namespace_ownership_limit),
            SqlValue::Bool(self.email_marketing),
            self.preferred_namespace_id.into(),
            SqlValue::Bool(self.mfa_enabled),
        ]
    }
}

pub fn convert(doc: UserDocument) -> UserRow {
    let auth_methods = if doc.preferences.auth_methods.is_empty() {
        vec![DEFAULT_AUTH_METHOD.to_string()]
    } else {
        doc.preferences.auth_methods
    };
    let preferred = doc.preferences.preferred_namespace;
    UserRow {
        id: id::translate(&doc.id),
        created_at: or_zero(doc.created_at),
        updated_at: or_zero(doc.updated_at),
        last_login: doc.last_login,
        origin: or_default(doc.origin, DEFAULT_ORIGIN),
        external_id: doc.external_id,
        status: or_default(doc.status, DEFAULT_STATUS),
        name: doc.name,
        username: doc.username,
        email: doc.email,
        recovery_email: doc.recovery_email,
        password_digest: doc.password,
        auth_methods,
        namespace_ownership_limit: doc.max_namespaces,
        email_marketing: doc.email_marketing,
        preferred_namespace_id: (!preferred.is_empty()).then(|| id::translate(&preferred)),
        mfa_enabled: doc.mfa.enabled,
    }
}

pub struct UserConverter;

impl Converter for UserConverter {
    type Document = UserDocument;
    type Row = UserRow;
    const COLLECTION: &'static str = collections::USERS;

    fn convert(&self, doc: UserDocument, out: &mut Vec<UserRow>) {
        out.push(convert(doc));
    }
}

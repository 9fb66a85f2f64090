//! Instance-wide system settings.

use serde::Deserialize;
use uuid::Uuid;

use super::{zero_time, Converter, TargetRow};
use crate::core::schema::{self, TableDef};
use crate::core::{Row, SqlValue};
use crate::id;
use crate::source::{collections, extjson};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SystemDocument {
    #[serde(rename = "_id", deserialize_with = "extjson::id")]
    pub id: String,
    #[serde(deserialize_with = "extjson::or_default")]
    pub setup: bool,
    #[serde(deserialize_with = "extjson::or_default")]
    pub authentication: Authentication,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Authentication {
    #[serde(deserialize_with = "extjson::or_default")]
    pub local: LocalAuth,
    #[serde(deserialize_with = "extjson::or_default")]
    pub saml: SamlAuth,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LocalAuth {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SamlAuth {
    pub enabled: bool,
    #[serde(deserialize_with = "extjson::or_default")]
    pub idp: SamlIdp,
    #[serde(deserialize_with = "extjson::or_default")]
    pub sp: SamlSp,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SamlIdp {
    #[serde(deserialize_with = "extjson::string")]
    pub entity_id: String,
    #[serde(deserialize_with = "extjson::string")]
    pub signon_url: String,
    #[serde(deserialize_with = "extjson::string_list")]
    pub certificates: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SamlSp {
    pub sign_requests: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemRow {
    pub id: Uuid,
    pub setup: bool,
    pub local_auth_enabled: bool,
    pub saml_auth_enabled: bool,
    pub saml_idp_entity_id: String,
    pub saml_idp_signon_url: String,
    pub saml_idp_certificates: Vec<String>,
    pub saml_sp_sign_requests: bool,
}

impl TargetRow for SystemRow {
    const TABLE: &'static TableDef = &schema::SYSTEM;

    fn into_values(self) -> Row {
        // The system document carries no timestamps.
        vec![
            SqlValue::Uuid(self.id),
            SqlValue::Timestamp(zero_time()),
            SqlValue::Timestamp(zero_time()),
            SqlValue::Bool(self.setup),
            SqlValue::Bool(self.local_auth_enabled),
            SqlValue::Bool(self.saml_auth_enabled),
            SqlValue::Text(self.saml_idp_entity_id),
            SqlValue::Text(self.saml_idp_signon_url),
            SqlValue::TextArray(self.saml_idp_certificates),
            SqlValue::Bool(self.saml_sp_sign_requests),
        ]
    }
}

pub fn convert(doc: SystemDocument) -> SystemRow {
    let SystemDocument {
        id,
        setup,
        authentication,
    } = doc;
    let saml = authentication.saml;
    SystemRow {
        id: id::translate(&id),
        setup,
        local_auth_enabled: authentication.local.enabled,
        saml_auth_enabled: saml.enabled,
        saml_idp_entity_id: saml.idp.entity_id,
        saml_idp_signon_url: saml.idp.signon_url,
        saml_idp_certificates: saml.idp.certificates,
        saml_sp_sign_requests: saml.sp.sign_requests,
    }
}

pub struct SystemConverter;

impl Converter for SystemConverter {
    type Document = SystemDocument;
    type Row = SystemRow;
    const COLLECTION: &'static str = collections::SYSTEM;

    fn convert(&self, doc: SystemDocument, out: &mut Vec<SystemRow>) {
        out.push(convert(doc));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::decode;
    use serde_json::json;

    #[test]
    fn test_missing_authentication_is_zero_valued() {
        let doc: SystemDocument = decode("system", json!({"_id": "sys", "setup": true})).unwrap();
        let row = convert(doc);
        assert!(row.setup);
        assert!(!row.local_auth_enabled);
        assert!(!row.saml_auth_enabled);
        assert_eq!(row.saml_idp_entity_id, "");
        assert!(row.saml_idp_certificates.is_empty());
        assert_eq!(row.into_values().len(), schema::SYSTEM.columns.len());
    }

    #[test]
    fn test_saml_block_flattens() {
        let doc: SystemDocument = decode(
            "system",
            json!({
                "_id": {"$oid": "65f0a1b2c3d4e5f6a7b8c9d0"},
                "authentication": {
                    "local": {"enabled": true},
                    "saml": {
                        "enabled": true,
                        "idp": {"entity_id": "urn:idp", "signon_url": "https://idp/sso", "certificates": ["MIIC"]},
                        "sp": {"sign_requests": true}
                    }
                }
            }),
        )
        .unwrap();
        let row = convert(doc);
        assert_eq!(row.id, id::translate("65f0a1b2c3d4e5f6a7b8c9d0"));
        assert!(row.local_auth_enabled);
        assert_eq!(row.saml_idp_signon_url, "https://idp/sso");
        assert_eq!(row.saml_idp_certificates, vec!["MIIC".to_string()]);
        assert!(row.saml_sp_sign_requests);
    }
}

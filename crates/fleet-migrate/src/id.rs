//! Legacy identifier translation.
//!
//! Document-store identifiers (ObjectId hex strings, device UIDs, session
//! UIDs, tenant ids) are not usable as relational primary keys. Every legacy
//! identifier is mapped to a name-based UUID (version 5) under one fixed
//! namespace, so independently migrated tables agree on the translated value
//! of any reference without a lookup table.

use uuid::Uuid;

/// Namespace under which all legacy identifiers are hashed.
///
/// Changing this value changes every migrated primary key.
pub const LEGACY_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_7d2e_4a3b_4c5d_9e8f_0a1b_2c3d_4e5f);

/// Translate a legacy identifier into its stable relational identifier.
///
/// Total and pure: the empty string is a valid input and yields a valid UUID.
pub fn translate(legacy_id: &str) -> Uuid {
    Uuid::new_v5(&LEGACY_ID_NAMESPACE, legacy_id.as_bytes())
}

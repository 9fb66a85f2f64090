//! Relational table contract for the migrated fleet data.
//!
//! The target DDL is owned elsewhere; the migration only needs each table's
//! name, its column order, its primary key, and the foreign keys that force
//! insert ordering. Every foreign key references the `id` column of its
//! parent table.
//!
//! Legacy owner/creator references (`namespaces.owner_id`,
//! `api_keys.created_by`) carry no foreign key: older documents leave them
//! empty, which translates to an identifier no user row has.

/// A foreign key from one column to the `id` of a parent table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKeyDef {
    pub column: &'static str,
    pub references: &'static str,
}

/// Static description of one target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub primary_key: &'static [&'static str],
    pub foreign_keys: &'static [ForeignKeyDef],
}

impl TableDef {
    /// Position of a column in the row layout.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == column)
    }

    /// Positions of the primary key columns in the row layout.
    pub fn primary_key_indexes(&self) -> Vec<usize> {
        self.primary_key
            .iter()
            .filter_map(|c| self.column_index(c))
            .collect()
    }

    /// Whether any foreign key of this table points at `parent`.
    pub fn references(&self, parent: &str) -> bool {
        self.foreign_keys.iter().any(|fk| fk.references == parent)
    }
}

const fn fk(column: &'static str, references: &'static str) -> ForeignKeyDef {
    ForeignKeyDef { column, references }
}

/// Name of the progress table written by the state store.
pub const MIGRATION_STATE_TABLE: &str = "migration_state";

pub const SYSTEM: TableDef = TableDef {
    name: "system",
    columns: &[
        "id",
        "created_at",
        "updated_at",
        "setup",
        "local_auth_enabled",
        "saml_auth_enabled",
        "saml_idp_entity_id",
        "saml_idp_signon_url",
        "saml_idp_certificates",
        "saml_sp_sign_requests",
    ],
    primary_key: &["id"],
    foreign_keys: &[],
};

pub const NAMESPACES: TableDef = TableDef {
    name: "namespaces",
    columns: &[
        "id",
        "created_at",
        "updated_at",
        "name",
        "owner_id",
        "type",
        "max_devices",
        "devices_accepted_count",
        "devices_pending_count",
        "devices_rejected_count",
        "devices_removed_count",
        "session_record",
        "connection_announcement",
    ],
    primary_key: &["id"],
    foreign_keys: &[],
};

pub const USERS: TableDef = TableDef {
    name: "users",
    columns: &[
        "id",
        "created_at",
        "updated_at",
        "last_login",
        "origin",
        "external_id",
        "status",
        "name",
        "username",
        "email",
        "recovery_email",
        "password_digest",
        "auth_methods",
        "namespace_ownership_limit",
        "email_marketing",
        "preferred_namespace_id",
        "mfa_enabled",
    ],
    primary_key: &["id"],
    foreign_keys: &[],
};

pub const TAGS: TableDef = TableDef {
    name: "tags",
    columns: &["id", "namespace_id", "name", "created_at", "updated_at"],
    primary_key: &["id"],
    foreign_keys: &[fk("namespace_id", "namespaces")],
};

pub const MEMBERSHIPS: TableDef = TableDef {
    name: "memberships",
    columns: &[
        "namespace_id",
        "user_id",
        "role",
        "status",
        "created_at",
        "updated_at",
    ],
    primary_key: &["namespace_id", "user_id"],
    foreign_keys: &[fk("namespace_id", "namespaces"), fk("user_id", "users")],
};

pub const API_KEYS: TableDef = TableDef {
    name: "api_keys",
    columns: &[
        "id",
        "namespace_id",
        "key_digest",
        "name",
        "role",
        "created_by",
        "expires_in",
        "created_at",
        "updated_at",
    ],
    primary_key: &["id"],
    foreign_keys: &[fk("namespace_id", "namespaces")],
};

pub const PUBLIC_KEYS: TableDef = TableDef {
    name: "public_keys",
    columns: &[
        "id",
        "namespace_id",
        "fingerprint",
        "name",
        "data",
        "username",
        "filter_hostname",
        "created_at",
        "updated_at",
    ],
    primary_key: &["id"],
    foreign_keys: &[fk("namespace_id", "namespaces")],
};

pub const DEVICES: TableDef = TableDef {
    name: "devices",
    columns: &[
        "id",
        "namespace_id",
        "name",
        "status",
        "mac",
        "identifier",
        "pretty_name",
        "version",
        "arch",
        "platform",
        "public_key",
        "remote_addr",
        "latitude",
        "longitude",
        "created_at",
        "updated_at",
        "last_seen",
        "disconnected_at",
        "status_updated_at",
    ],
    primary_key: &["id"],
    foreign_keys: &[fk("namespace_id", "namespaces")],
};

pub const DEVICE_TAGS: TableDef = TableDef {
    name: "device_tags",
    columns: &["device_id", "tag_id"],
    primary_key: &["device_id", "tag_id"],
    foreign_keys: &[fk("device_id", "devices"), fk("tag_id", "tags")],
};

pub const PUBLIC_KEY_TAGS: TableDef = TableDef {
    name: "public_key_tags",
    columns: &["public_key_id", "tag_id"],
    primary_key: &["public_key_id", "tag_id"],
    foreign_keys: &[fk("public_key_id", "public_keys"), fk("tag_id", "tags")],
};

pub const SESSIONS: TableDef = TableDef {
    name: "sessions",
    columns: &[
        "id",
        "device_id",
        "namespace_id",
        "username",
        "ip_address",
        "authenticated",
        "active",
        "recorded",
        "type",
        "term",
        "latitude",
        "longitude",
        "created_at",
        "updated_at",
        "closed_at",
    ],
    primary_key: &["id"],
    foreign_keys: &[
        fk("device_id", "devices"),
        fk("namespace_id", "namespaces"),
    ],
};

pub const SESSION_EVENTS: TableDef = TableDef {
    name: "session_events",
    columns: &["id", "session_id", "type", "seat", "data", "created_at"],
    primary_key: &["id"],
    foreign_keys: &[fk("session_id", "sessions")],
};

/// Every target table, parents before children.
pub const TABLES: &[TableDef] = &[
    SYSTEM,
    NAMESPACES,
    USERS,
    TAGS,
    MEMBERSHIPS,
    API_KEYS,
    PUBLIC_KEYS,
    DEVICES,
    DEVICE_TAGS,
    PUBLIC_KEY_TAGS,
    SESSIONS,
    SESSION_EVENTS,
];

/// Look up a table by name.
pub fn table(name: &str) -> Option<&'static TableDef> {
    TABLES.iter().find(|t| t.name == name)
}

/// Tables holding a foreign key to `parent`.
pub fn children_of(parent: &str) -> impl Iterator<Item = &'static TableDef> + '_ {
    TABLES.iter().filter(move |t| t.references(parent))
}

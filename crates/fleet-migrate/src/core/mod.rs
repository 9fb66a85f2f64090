//! Core types shared by the converters and the storage drivers.
//!
//! - [`schema`]: the relational table contract (names, columns, keys)
//! - [`value`]: owned SQL values that converted rows are made of
//! - [`identifier`]: quoting for dynamically built PostgreSQL statements

pub mod identifier;
pub mod schema;
pub mod value;

pub use schema::{ForeignKeyDef, TableDef};
pub use value::{Row, SqlValue};

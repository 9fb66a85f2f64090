//! Identifier validation and quoting for dynamically built PostgreSQL statements.
//!
//! Table and column names cannot be bound as statement parameters, so the
//! target driver quotes them itself. Names come from the static schema
//! contract, but the target schema name comes from configuration and is
//! validated the same way.

use crate::error::{MigrateError, Result};

/// PostgreSQL truncates identifiers longer than this many bytes.
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validate an identifier before it is spliced into SQL.
///
/// Rejects empty identifiers, identifiers containing null bytes, and
/// identifiers longer than PostgreSQL keeps.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier, doubling embedded double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Qualify a PostgreSQL table name with its schema.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Quote a list of column names and join them with commas.
pub fn quote_pg_list(columns: &[&str]) -> Result<String> {
    let quoted = columns
        .iter()
        .map(|c| quote_pg(c))
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(", "))
}

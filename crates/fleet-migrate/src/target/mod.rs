//! Relational store target operations.

mod memory;
mod postgres;
pub mod tls;

pub use memory::MemoryTarget;
pub use postgres::PgTarget;

use crate::core::identifier::quote_pg;
use crate::core::{Row, SqlValue};
use crate::error::Result;
use async_trait::async_trait;

/// Trait for relational store writes and reads.
///
/// Table names are bare; implementations resolve them against their own
/// schema.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Insert `rows` in one transaction. Returns the number of rows written.
    async fn bulk_insert(&self, table: &str, columns: &[&str], rows: Vec<Row>) -> Result<u64>;

    /// Remove every row of `table`, and of tables referencing it when `cascade`.
    async fn truncate(&self, table: &str, cascade: bool) -> Result<()>;

    /// Fetch `columns` of the rows whose columns equal the filter values.
    async fn select(
        &self,
        table: &str,
        columns: &[&str],
        filter: &[(&str, SqlValue)],
    ) -> Result<Vec<Row>>;

    /// Count the rows of `table`.
    async fn count(&self, table: &str) -> Result<i64>;

    /// Execute a raw statement.
    async fn exec_raw(&self, sql: &str) -> Result<()>;

    /// Quoted, schema-qualified name of `table` for raw statements.
    fn qualify(&self, table: &str) -> Result<String> {
        quote_pg(table)
    }

    /// Get the target type, for logging.
    fn target_type(&self) -> &str;
}

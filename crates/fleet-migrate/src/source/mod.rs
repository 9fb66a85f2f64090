//! Document store source operations.
//!
//! The source is read through [`DocumentSource`]: lazy, finite cursors over
//! named collections. A cursor is not restartable; querying again opens a
//! fresh one.

pub mod extjson;
mod jsonl;
mod memory;
pub mod pipeline;

pub use jsonl::JsonlSource;
pub use memory::MemorySource;
pub use pipeline::{FindOptions, Filter, Stage};

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

/// Lazy stream of raw documents.
pub type DocumentCursor = BoxStream<'static, Result<Value>>;

/// Source collection names.
pub mod collections {
    pub const SYSTEM: &str = "system";
    pub const NAMESPACES: &str = "namespaces";
    pub const USERS: &str = "users";
    pub const TAGS: &str = "tags";
    pub const DEVICES: &str = "devices";
    pub const PUBLIC_KEYS: &str = "public_keys";
    pub const API_KEYS: &str = "api_keys";
    pub const SESSIONS: &str = "sessions";
    pub const ACTIVE_SESSIONS: &str = "active_sessions";
    pub const SESSIONS_EVENTS: &str = "sessions_events";
}

/// Trait for document store reads.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Stream the documents of `collection` matching `filter`.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<DocumentCursor>;

    /// Run an aggregation pipeline over `collection`.
    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> Result<DocumentCursor>;

    /// Count the documents of `collection` matching `filter`.
    async fn count_documents(&self, collection: &str, filter: &Filter) -> Result<i64>;

    /// Get the source type, for logging.
    fn source_type(&self) -> &str;
}

/// Apply a filter and find options to an unfiltered collection stream.
fn narrow(cursor: DocumentCursor, filter: &Filter, options: FindOptions) -> DocumentCursor {
    let mut stages = vec![Stage::Match(filter.clone())];
    if let Some(limit) = options.limit {
        stages.push(Stage::Limit(limit));
    }
    pipeline::apply(cursor, &stages)
}

/// Count the documents left in a cursor.
async fn drain_count(mut cursor: DocumentCursor) -> Result<i64> {
    use futures::StreamExt;

    let mut n = 0i64;
    while let Some(item) = cursor.next().await {
        item?;
        n += 1;
    }
    Ok(n)
}

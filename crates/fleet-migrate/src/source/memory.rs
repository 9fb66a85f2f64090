//! In-memory document source.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;

use super::{drain_count, narrow, pipeline, DocumentCursor, DocumentSource, Filter, FindOptions, Stage};
use crate::error::{MigrateError, Result};

/// Document source backed by in-process collections.
///
/// Cursors snapshot the collection when opened, so edits made afterwards are
/// only visible to later queries.
#[derive(Default)]
pub struct MemorySource {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`MemorySource::insert`].
    pub fn with(self, collection: &str, docs: Vec<Value>) -> Self {
        self.insert(collection, docs);
        self
    }

    /// Append documents to a collection.
    pub fn insert(&self, collection: &str, docs: Vec<Value>) {
        if let Ok(mut collections) = self.collections.write() {
            collections
                .entry(collection.to_string())
                .or_default()
                .extend(docs);
        }
    }

    /// Apply `f` to every document of a collection.
    pub fn update(&self, collection: &str, mut f: impl FnMut(&mut Value)) {
        if let Ok(mut collections) = self.collections.write() {
            if let Some(docs) = collections.get_mut(collection) {
                docs.iter_mut().for_each(&mut f);
            }
        }
    }

    fn snapshot(&self, collection: &str) -> Result<DocumentCursor> {
        let collections = self
            .collections
            .read()
            .map_err(|e| MigrateError::Source(format!("source lock poisoned: {}", e)))?;
        let docs = collections.get(collection).cloned().unwrap_or_default();
        Ok(stream::iter(docs.into_iter().map(Ok)).boxed())
    }
}

#[async_trait]
impl DocumentSource for MemorySource {
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<DocumentCursor> {
        Ok(narrow(self.snapshot(collection)?, filter, options))
    }

    async fn aggregate(&self, collection: &str, stages: &[Stage]) -> Result<DocumentCursor> {
        Ok(pipeline::apply(self.snapshot(collection)?, stages))
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> Result<i64> {
        drain_count(narrow(
            self.snapshot(collection)?,
            filter,
            FindOptions::default(),
        ))
        .await
    }

    fn source_type(&self) -> &str {
        "memory"
    }
}

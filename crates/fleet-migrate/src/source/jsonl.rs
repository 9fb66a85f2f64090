//! Source driver over a directory of line-delimited Extended JSON dumps.

use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use super::{drain_count, narrow, pipeline, DocumentCursor, DocumentSource, Filter, FindOptions, Stage};
use crate::error::{MigrateError, Result};

/// Reads `<dump_dir>/<collection>.jsonl`, one document per line.
///
/// A collection without a dump file is treated as empty, matching how the
/// document store reports collections that were never created.
pub struct JsonlSource {
    dump_dir: PathBuf,
}

impl JsonlSource {
    /// Open a dump directory.
    pub fn new(dump_dir: impl Into<PathBuf>) -> Result<Self> {
        let dump_dir = dump_dir.into();
        if !dump_dir.is_dir() {
            return Err(MigrateError::Source(format!(
                "dump directory {} does not exist",
                dump_dir.display()
            )));
        }
        Ok(Self { dump_dir })
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.dump_dir.join(format!("{}.jsonl", collection))
    }

    /// Stream every document of a collection without filtering.
    async fn scan(&self, collection: &str) -> Result<DocumentCursor> {
        let path = self.collection_path(collection);
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{}: no dump file, treating as empty", collection);
                return Ok(stream::empty().boxed());
            }
            Err(e) => {
                return Err(MigrateError::Source(format!(
                    "failed to open {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let collection = collection.to_string();
        let lines = BufReader::new(file).lines();
        let cursor = stream::unfold((lines, 0usize), move |(mut lines, mut line_no)| {
            let collection = collection.clone();
            async move {
                loop {
                    line_no += 1;
                    match lines.next_line().await {
                        Ok(Some(line)) if line.trim().is_empty() => continue,
                        Ok(Some(line)) => {
                            let doc = serde_json::from_str(&line).map_err(|e| {
                                MigrateError::Decode {
                                    collection: collection.clone(),
                                    message: format!("line {}: {}", line_no, e),
                                }
                            });
                            return Some((doc, (lines, line_no)));
                        }
                        Ok(None) => return None,
                        Err(e) => {
                            let err = MigrateError::Source(format!(
                                "{} line {}: {}",
                                collection, line_no, e
                            ));
                            return Some((Err(err), (lines, line_no)));
                        }
                    }
                }
            }
        });
        Ok(cursor.boxed())
    }
}

#[async_trait]
impl DocumentSource for JsonlSource {
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<DocumentCursor> {
        Ok(narrow(self.scan(collection).await?, filter, options))
    }

    async fn aggregate(&self, collection: &str, stages: &[Stage]) -> Result<DocumentCursor> {
        Ok(pipeline::apply(self.scan(collection).await?, stages))
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> Result<i64> {
        drain_count(narrow(
            self.scan(collection).await?,
            filter,
            FindOptions::default(),
        ))
        .await
    }

    fn source_type(&self) -> &str {
        "jsonl"
    }
}

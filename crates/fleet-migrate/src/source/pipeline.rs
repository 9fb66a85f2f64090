//! Document filters and the aggregation stages the migration needs.
//!
//! Both source drivers evaluate these over a document stream, so filtering
//! and unwinding stay lazy and never materialise a whole collection.

use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};

use super::DocumentCursor;
use crate::error::{MigrateError, Result};

/// Equality filter over dotted field paths. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Match every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match documents whose `path` equals `value`.
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and_eq(path, value)
    }

    /// Add another equality condition.
    pub fn and_eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((path.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Whether `doc` satisfies every condition.
    ///
    /// Wrapped scalars (`{"$oid": ..}` and friends) compare by their inner value.
    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|(path, expected)| {
            lookup(doc, path).is_some_and(|actual| scalar(actual) == scalar(expected))
        })
    }
}

/// Options for `find`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Stop after this many documents.
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn limit(n: usize) -> Self {
        Self { limit: Some(n) }
    }
}

/// One aggregation pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keep documents matching the filter.
    Match(Filter),

    /// Emit one document per element of the array at the path, with the array
    /// replaced by that element. Missing, null and empty arrays drop the
    /// document; a non-array value passes through as a single element.
    Unwind(String),

    /// Keep the first N documents.
    Limit(usize),

    /// Replace the stream with a single `{name: count}` document. An empty
    /// input produces no document at all.
    Count(String),
}

/// Resolve a dotted path inside a document.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(doc, |current, key| current.as_object()?.get(key))
}

fn scalar(value: &Value) -> &Value {
    match value {
        Value::Object(map) if map.len() == 1 => {
            match map.iter().next() {
                Some((key, inner)) if key.starts_with('$') => inner,
                _ => value,
            }
        }
        _ => value,
    }
}

fn replace_at(doc: &mut Value, path: &str, replacement: Value) {
    let mut current = doc;
    let mut keys = path.split('.').peekable();
    while let Some(key) = keys.next() {
        let Some(map) = current.as_object_mut() else {
            return;
        };
        if keys.peek().is_none() {
            map.insert(key.to_string(), replacement);
            return;
        }
        match map.get_mut(key) {
            Some(next) => current = next,
            None => return,
        }
    }
}

fn unwind(doc: Value, path: &str) -> Vec<Value> {
    let elements = match lookup(&doc, path) {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => Some(items.clone()),
        Some(_) => None,
    };
    let Some(elements) = elements else {
        return vec![doc];
    };
    elements
        .into_iter()
        .map(|element| {
            let mut out = doc.clone();
            replace_at(&mut out, path, element);
            out
        })
        .collect()
}

/// Apply `stages` to a document stream, in order.
pub fn apply(cursor: DocumentCursor, stages: &[Stage]) -> DocumentCursor {
    stages
        .iter()
        .cloned()
        .fold(cursor, |cursor, stage| apply_stage(cursor, stage))
}

fn apply_stage(cursor: DocumentCursor, stage: Stage) -> DocumentCursor {
    match stage {
        Stage::Match(filter) if filter.is_empty() => cursor,
        Stage::Match(filter) => cursor
            .filter(move |item| {
                let keep = match item {
                    Ok(doc) => filter.matches(doc),
                    Err(_) => true,
                };
                futures::future::ready(keep)
            })
            .boxed(),
        Stage::Unwind(path) => cursor
            .flat_map(move |item| {
                let items: Vec<Result<Value>> = match item {
                    Ok(doc) => unwind(doc, &path).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                stream::iter(items)
            })
            .boxed(),
        Stage::Limit(n) => cursor.take(n).boxed(),
        Stage::Count(field) => {
            let counted = async move {
                let mut cursor = cursor;
                let mut n: i64 = 0;
                while let Some(item) = cursor.next().await {
                    item?;
                    n += 1;
                }
                Ok::<i64, MigrateError>(n)
            };
            stream::once(counted)
                .filter_map(move |res: Result<i64>| {
                    let out = match res {
                        Ok(0) => None,
                        Ok(n) => {
                            let mut doc = Map::new();
                            doc.insert(field.clone(), Value::from(n));
                            Some(Ok(Value::Object(doc)))
                        }
                        Err(e) => Some(Err(e)),
                    };
                    futures::future::ready(out)
                })
                .boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;

    fn cursor(docs: Vec<Value>) -> DocumentCursor {
        stream::iter(docs.into_iter().map(Ok)).boxed()
    }

    async fn collect(cursor: DocumentCursor) -> Vec<Value> {
        cursor.try_collect().await.unwrap()
    }

    #[test]
    fn test_filter_matches_nested_and_wrapped() {
        let doc = json!({"_id": {"$oid": "abc"}, "info": {"arch": "arm64"}});
        assert!(Filter::eq("_id", "abc").matches(&doc));
        assert!(Filter::eq("info.arch", "arm64").matches(&doc));
        assert!(!Filter::eq("info.arch", "amd64").matches(&doc));
        assert!(!Filter::eq("missing", "x").matches(&doc));
        assert!(Filter::all().matches(&doc));
    }

    #[tokio::test]
    async fn test_unwind_drops_empty_and_missing() {
        let docs = vec![
            json!({"n": 1, "members": [{"id": "a"}, {"id": "b"}]}),
            json!({"n": 2, "members": []}),
            json!({"n": 3}),
            json!({"n": 4, "members": null}),
            json!({"n": 5, "members": {"id": "c"}}),
        ];
        let out = collect(apply(cursor(docs), &[Stage::Unwind("members".into())])).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0]["members"]["id"], "a");
        assert_eq!(out[1]["members"]["id"], "b");
        assert_eq!(out[2]["n"], 5);
    }

    #[tokio::test]
    async fn test_unwind_nested_path() {
        let docs = vec![json!({"filter": {"tag_ids": ["t1", "t2"], "hostname": ".*"}})];
        let out = collect(apply(
            cursor(docs),
            &[Stage::Unwind("filter.tag_ids".into())],
        ))
        .await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[1]["filter"]["tag_ids"], "t2");
        assert_eq!(out[1]["filter"]["hostname"], ".*");
    }

    #[tokio::test]
    async fn test_count_stage() {
        let docs = vec![
            json!({"members": [1, 2, 3]}),
            json!({"members": [4, 5, 6]}),
        ];
        let out = collect(apply(
            cursor(docs),
            &[Stage::Unwind("members".into()), Stage::Count("count".into())],
        ))
        .await;
        assert_eq!(out, vec![json!({"count": 6})]);
    }

    #[tokio::test]
    async fn test_count_of_nothing_is_empty() {
        let out = collect(apply(cursor(vec![]), &[Stage::Count("count".into())])).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_match_and_limit() {
        let docs = (0..10).map(|i| json!({"i": i, "even": i % 2 == 0})).collect();
        let out = collect(apply(
            cursor(docs),
            &[Stage::Match(Filter::eq("even", true)), Stage::Limit(2)],
        ))
        .await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[1]["i"], 2);
    }
}

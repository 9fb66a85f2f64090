//! In-memory target.
//!
//! Enforces the primary and foreign keys of the table contract the way the
//! relational store would, so ordering mistakes surface in tests. Each
//! `bulk_insert` is all-or-nothing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::TargetStore;
use crate::core::schema::{self, TableDef};
use crate::core::{Row, SqlValue};
use crate::error::{MigrateError, Result};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn table_def(table: &str) -> Result<&'static TableDef> {
    schema::table(table).ok_or_else(|| MigrateError::transfer(table, "relation does not exist"))
}

/// Relational target held in process memory.
#[derive(Default)]
pub struct MemoryTarget {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    fail_after: Mutex<HashMap<String, u64>>,
    inserted: Mutex<HashMap<String, u64>>,
    disabled_triggers: Mutex<HashSet<String>>,
    executed: Mutex<Vec<String>>,
    writes: AtomicU64,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make inserts into `table` fail once `rows` rows have been written to it.
    pub fn fail_inserts_after(&self, table: &str, rows: u64) {
        lock(&self.fail_after).insert(table.to_string(), rows);
        lock(&self.inserted).insert(table.to_string(), 0);
    }

    pub fn clear_faults(&self) {
        lock(&self.fail_after).clear();
    }

    /// Snapshot of the rows of `table`.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        lock(&self.tables).get(table).cloned().unwrap_or_default()
    }

    /// Delete rows whose `column` equals `value`, ignoring foreign keys.
    pub fn delete_where(&self, table: &str, column: &str, value: &SqlValue) -> usize {
        let Some(idx) = schema::table(table).and_then(|t| t.column_index(column)) else {
            return 0;
        };
        let mut tables = lock(&self.tables);
        let Some(rows) = tables.get_mut(table) else {
            return 0;
        };
        let before = rows.len();
        rows.retain(|row| row.get(idx) != Some(value));
        before - rows.len()
    }

    /// Number of write operations (inserts, truncates, raw statements) served.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Raw statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        lock(&self.executed).clone()
    }

    /// Whether triggers on `table` are currently disabled.
    pub fn triggers_disabled(&self, table: &str) -> bool {
        lock(&self.disabled_triggers).contains(table)
    }

    fn check_rows(
        &self,
        tables: &HashMap<String, Vec<Row>>,
        def: &TableDef,
        rows: &[Row],
    ) -> Result<()> {
        let pk = def.primary_key_indexes();
        let key_of = |row: &Row| -> Vec<String> { pk.iter().map(|i| row[*i].to_string()).collect() };

        let mut seen: HashSet<Vec<String>> = tables
            .get(def.name)
            .map(|existing| existing.iter().map(key_of).collect())
            .unwrap_or_default();

        for row in rows {
            if row.len() != def.columns.len() {
                return Err(MigrateError::transfer(
                    def.name,
                    format!("row has {} values for {} columns", row.len(), def.columns.len()),
                ));
            }
            if !seen.insert(key_of(row)) {
                return Err(MigrateError::transfer(
                    def.name,
                    format!(
                        "duplicate key value violates unique constraint \"{}_pkey\"",
                        def.name
                    ),
                ));
            }
            for fk in def.foreign_keys {
                let Some(idx) = def.column_index(fk.column) else {
                    continue;
                };
                let value = &row[idx];
                if value.is_null() {
                    continue;
                }
                let parent_id = table_def(fk.references)?.column_index("id").unwrap_or(0);
                let found = tables
                    .get(fk.references)
                    .is_some_and(|parent| parent.iter().any(|p| &p[parent_id] == value));
                if !found {
                    return Err(MigrateError::transfer(
                        def.name,
                        format!(
                            "insert violates foreign key {} -> {}: {} not present",
                            fk.column, fk.references, value
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Tables emptied by `TRUNCATE .. CASCADE` on `table`.
fn cascade_set(table: &str) -> Vec<&'static str> {
    let mut out = Vec::new();
    let mut pending = vec![table.to_string()];
    while let Some(current) = pending.pop() {
        for child in schema::children_of(&current) {
            if !out.contains(&child.name) {
                out.push(child.name);
                pending.push(child.name.to_string());
            }
        }
    }
    out
}

fn trigger_target(sql: &str) -> Option<(String, bool)> {
    let rest = sql.trim().strip_prefix("ALTER TABLE ")?;
    let (name, enable) = if let Some(name) = rest.strip_suffix(" DISABLE TRIGGER ALL") {
        (name, false)
    } else {
        (rest.strip_suffix(" ENABLE TRIGGER ALL")?, true)
    };
    let bare = name.rsplit('.').next().unwrap_or(name).trim_matches('"');
    Some((bare.to_string(), enable))
}

#[async_trait]
impl TargetStore for MemoryTarget {
    async fn bulk_insert(&self, table: &str, columns: &[&str], rows: Vec<Row>) -> Result<u64> {
        let def = table_def(table)?;
        if columns != def.columns {
            return Err(MigrateError::transfer(
                table,
                format!("column list {:?} does not match table layout", columns),
            ));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);

        let n = rows.len() as u64;
        if let Some(limit) = lock(&self.fail_after).get(table).copied() {
            let mut inserted = lock(&self.inserted);
            let done = inserted.entry(table.to_string()).or_default();
            if *done + n > limit {
                return Err(MigrateError::transfer(
                    table,
                    format!("injected failure after {} rows", *done),
                ));
            }
            *done += n;
        }

        let mut tables = lock(&self.tables);
        self.check_rows(&tables, def, &rows)?;
        tables.entry(table.to_string()).or_default().extend(rows);
        Ok(n)
    }

    async fn truncate(&self, table: &str, cascade: bool) -> Result<()> {
        table_def(table)?;
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut tables = lock(&self.tables);
        let dependents = cascade_set(table);
        if !cascade {
            if let Some(child) = dependents
                .iter()
                .find(|t| tables.get(**t).is_some_and(|rows| !rows.is_empty()))
            {
                return Err(MigrateError::transfer(
                    table,
                    format!("cannot truncate a table referenced by {}", child),
                ));
            }
        }
        tables.remove(table);
        for name in &dependents {
            tables.remove(*name);
        }
        Ok(())
    }

    async fn select(
        &self,
        table: &str,
        columns: &[&str],
        filter: &[(&str, SqlValue)],
    ) -> Result<Vec<Row>> {
        let def = table_def(table)?;
        let lookup = |column: &str| {
            def.column_index(column).ok_or_else(|| {
                MigrateError::transfer(table, format!("column \"{}\" does not exist", column))
            })
        };
        let projection = columns.iter().map(|c| lookup(*c)).collect::<Result<Vec<_>>>()?;
        let conditions = filter
            .iter()
            .map(|(c, v)| Ok((lookup(*c)?, v)))
            .collect::<Result<Vec<_>>>()?;

        let tables = lock(&self.tables);
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| conditions.iter().all(|(i, v)| &row[*i] == *v))
                    .map(|row| projection.iter().map(|i| row[*i].clone()).collect())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count(&self, table: &str) -> Result<i64> {
        table_def(table)?;
        Ok(lock(&self.tables).get(table).map_or(0, |rows| rows.len() as i64))
    }

    async fn exec_raw(&self, sql: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        lock(&self.executed).push(sql.to_string());
        if let Some((table, enable)) = trigger_target(sql) {
            let mut disabled = lock(&self.disabled_triggers);
            if enable {
                disabled.remove(&table);
            } else {
                disabled.insert(table);
            }
        }
        Ok(())
    }

    fn target_type(&self) -> &str {
        "memory"
    }
}

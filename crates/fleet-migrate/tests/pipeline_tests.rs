//! End-to-end runs of the migration pipeline against in-memory stores.

use std::io::Write;
use std::sync::Arc;

use fleet_migrate::id::translate;
use fleet_migrate::verify::VerifyTier;
use fleet_migrate::{
    JobOutcome, JsonlSource, MemorySource, MemoryStateBackend, MemoryTarget, MigrateError,
    MigrationConfig, Migrator, ProgressUpdate, Row, SqlValue, StateBackend, TargetStore,
    TaskStatus,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const TOTAL_ROWS: u64 = 28;

fn collections() -> Vec<(&'static str, Vec<Value>)> {
    vec![
        (
            "system",
            vec![json!({"_id": {"$oid": "65f000000000000000000001"}, "setup": true,
                        "authentication": {"local": {"enabled": true}}})],
        ),
        (
            "namespaces",
            vec![
                json!({
                    "tenant_id": "tenant-a",
                    "name": "alpha",
                    "owner": "u1",
                    "type": "team",
                    "max_devices": {"$numberLong": "-1"},
                    "devices_accepted_count": 2,
                    "members": [
                        {"id": "u1", "role": "owner", "status": "accepted"},
                        {"id": "u2", "role": "operator", "status": "accepted"},
                        {"id": "u3", "role": "", "status": "pending"}
                    ],
                    "created_at": {"$date": "2023-01-10T08:00:00Z"}
                }),
                json!({
                    "tenant_id": "tenant-b",
                    "name": "beta",
                    "owner": "u2",
                    "type": "",
                    "members": [
                        {"id": "u2", "role": "owner"},
                        {"id": "u1", "role": "observer"},
                        {"id": "u4"}
                    ]
                }),
            ],
        ),
        (
            "users",
            vec![
                json!({"_id": "u1", "username": "alice", "email": "alice@example.com",
                       "password": {"hash": "$2a$10$alice"}, "status": "confirmed"}),
                json!({"_id": "u2", "username": "bob", "email": "bob@example.com",
                       "password": "$2a$10$bob"}),
                json!({"_id": "u3", "username": "carol", "email": "carol@example.com"}),
                json!({"_id": "u4", "username": "dave", "email": "dave@example.com",
                       "preferences": {"preferred_namespace": "tenant-b"}}),
            ],
        ),
        (
            "tags",
            vec![
                json!({"_id": "tag-1", "tenant_id": "tenant-a", "name": "prod"}),
                json!({"_id": "tag-2", "tenant_id": "tenant-a", "name": "edge"}),
            ],
        ),
        (
            "api_keys",
            vec![json!({"_id": "digest-1", "tenant_id": "tenant-a", "name": "ci",
                        "role": "operator", "created_by": "u1", "expires_in": -1})],
        ),
        (
            "public_keys",
            vec![json!({"_id": "pk-1", "tenant_id": "tenant-a", "fingerprint": "aa:bb",
                        "data": {"$binary": {"base64": "c3NoLWVkMjU1MTk=", "subType": "00"}},
                        "filter": {"hostname": "", "tag_ids": ["tag-1"]}})],
        ),
        (
            "devices",
            vec![
                json!({"uid": "d1", "tenant_id": "tenant-a", "name": "gateway", "status": "accepted",
                       "identity": {"mac": "aa:bb:cc:dd:ee:ff"}, "tag_ids": ["tag-1", "tag-2"],
                       "info": {"id": "debian", "pretty_name": "Debian 12"},
                       "position": {"latitude": 52.52, "longitude": 13.4}}),
                json!({"uid": "d2", "tenant_id": "tenant-a", "name": "sensor", "status": "pending"}),
                json!({"uid": "d3", "tenant_id": "tenant-b", "name": "bare", "status": ""}),
            ],
        ),
        (
            "sessions",
            vec![
                json!({"uid": "s1", "device_uid": "d1", "tenant_id": "tenant-a",
                       "username": "root", "type": "shell", "authenticated": true}),
                json!({"uid": "s2", "device_uid": "d2", "tenant_id": "tenant-a",
                       "username": "pi", "type": ""}),
            ],
        ),
        ("active_sessions", vec![json!({"uid": "s1"})]),
        (
            "sessions_events",
            vec![
                json!({"_id": "e1", "session": "s1", "type": "pty-req", "seat": 0}),
                json!({"_id": "e2", "session": "s1", "type": "pty-output", "data": {"output": "ls"}}),
                json!({"_id": "e3", "session": "s2", "type": "exit-status", "data": null}),
            ],
        ),
    ]
}

fn fixture() -> MemorySource {
    collections()
        .into_iter()
        .fold(MemorySource::new(), |source, (name, docs)| source.with(name, docs))
}

struct Harness {
    source: Arc<MemorySource>,
    target: Arc<MemoryTarget>,
    state: Arc<MemoryStateBackend>,
}

impl Harness {
    fn new() -> Self {
        Self {
            source: Arc::new(fixture()),
            target: Arc::new(MemoryTarget::new()),
            state: Arc::new(MemoryStateBackend::new()),
        }
    }

    fn migrator(&self, config: MigrationConfig) -> Migrator {
        Migrator::new(
            config,
            self.source.clone(),
            self.target.clone(),
            self.state.clone(),
        )
    }

    async fn cell(&self, table: &str, column: &str, id: &str) -> SqlValue {
        let rows = self
            .target
            .select(table, &[column], &[("id", SqlValue::Uuid(translate(id)))])
            .await
            .unwrap();
        rows[0][0].clone()
    }
}

#[tokio::test]
async fn test_full_run_migrates_and_validates() {
    let h = Harness::new();
    let result = h
        .migrator(MigrationConfig::default())
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, "completed");
    assert_eq!(result.tables.len(), 12);
    assert_eq!(result.tables_migrated, 12);
    assert_eq!(result.tables_skipped, 0);
    assert_eq!(result.rows_transferred, TOTAL_ROWS);
    assert!(result.validation.counts.iter().all(|c| c.is_match()));
    assert_eq!(
        result.validation.tiers_passed,
        vec![VerifyTier::Count, VerifyTier::Relationship, VerifyTier::SpotCheck]
    );

    for (table, rows) in [
        ("memberships", 6),
        ("device_tags", 2),
        ("public_key_tags", 1),
        ("session_events", 3),
    ] {
        assert_eq!(h.target.count(table).await.unwrap(), rows, "{}", table);
    }

    let states = h.state.list().await.unwrap();
    assert_eq!(states.len(), 12);
    assert!(states.iter().all(|s| s.status == TaskStatus::Completed));
    let events = h.state.get("session_events").await.unwrap().unwrap();
    assert_eq!(events.source_count, Some(3));
    assert_eq!(events.target_count, Some(3));

    let json = result.to_json().unwrap();
    assert!(json.contains("\"outcome\": \"migrated\""));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let h = Harness::new();
    let migrator = h.migrator(MigrationConfig::default());
    migrator.run(CancellationToken::new()).await.unwrap();
    let writes = h.target.write_count();
    let before = h.target.rows("devices");

    let second = migrator.run(CancellationToken::new()).await.unwrap();
    assert!(second.tables.iter().all(|t| t.outcome == JobOutcome::Skipped));
    assert_eq!(second.rows_transferred, 0);
    assert_eq!(h.target.write_count(), writes);
    assert_eq!(h.target.rows("devices"), before);
}

#[tokio::test]
async fn test_interrupted_table_is_truncated_and_redone() {
    let h = Harness::new();
    let config = MigrationConfig {
        batch_size: Some(1),
        ..Default::default()
    };
    h.target.fail_inserts_after("devices", 1);

    let err = h
        .migrator(config.clone())
        .run(CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(&err, MigrateError::Job { table, .. } if table == "devices"));
    let devices = h.state.get("devices").await.unwrap().unwrap();
    assert_eq!(devices.status, TaskStatus::InProgress);
    assert_eq!(h.target.count("devices").await.unwrap(), 1);
    assert!(h.state.get("device_tags").await.unwrap().is_none());

    h.target.clear_faults();
    let result = h.migrator(config).run(CancellationToken::new()).await.unwrap();
    let outcome = |table: &str| {
        result
            .tables
            .iter()
            .find(|t| t.table == table)
            .map(|t| t.outcome.clone())
            .unwrap()
    };
    assert_eq!(outcome("namespaces"), JobOutcome::Skipped);
    assert_eq!(outcome("public_keys"), JobOutcome::Skipped);
    assert_eq!(outcome("devices"), JobOutcome::Retried { rows: 3 });
    assert_eq!(outcome("device_tags"), JobOutcome::Migrated { rows: 2 });
    assert_eq!(h.target.count("devices").await.unwrap(), 3);
}

#[tokio::test]
async fn test_count_mismatch_is_reported_and_recorded() {
    let h = Harness::new();
    let migrator = h.migrator(MigrationConfig::default());
    migrator.run(CancellationToken::new()).await.unwrap();

    let removed = h
        .target
        .delete_where("session_events", "id", &SqlValue::Uuid(translate("e3")));
    assert_eq!(removed, 1);

    let err = migrator.validate(CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.exit_code(), 3);
    match err {
        MigrateError::CountMismatch {
            table,
            source_count,
            target_count,
        } => {
            assert_eq!(table, "session_events");
            assert_eq!((source_count, target_count), (3, 2));
        }
        other => panic!("unexpected error: {}", other),
    }

    let state = h.state.get("session_events").await.unwrap().unwrap();
    assert_eq!(state.source_count, Some(3));
    assert_eq!(state.target_count, Some(2));
}

#[tokio::test]
async fn test_membership_relationship_counts() {
    let h = Harness::new();
    let migrator = h.migrator(MigrationConfig::default());
    migrator.run(CancellationToken::new()).await.unwrap();

    let report = migrator.validate(CancellationToken::new()).await.unwrap();
    let members = report
        .relationships
        .iter()
        .find(|r| r.table == "memberships")
        .unwrap();
    assert_eq!((members.source_count, members.target_count), (6, 6));

    h.source.update("namespaces", |doc| {
        if doc["tenant_id"] == "tenant-a" {
            if let Some(members) = doc["members"].as_array_mut() {
                members.push(json!({"id": "u4", "role": "observer"}));
            }
        }
    });

    let err = migrator.validate(CancellationToken::new()).await.unwrap_err();
    match err {
        MigrateError::RelationshipMismatch {
            relation,
            source_count,
            target_count,
        } => {
            assert!(relation.contains("memberships"));
            assert_eq!((source_count, target_count), (7, 6));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_spot_check_catches_altered_row() {
    let h = Harness::new();
    let migrator = h.migrator(MigrationConfig::default());
    migrator.run(CancellationToken::new()).await.unwrap();

    h.source.update("users", |doc| {
        if doc["_id"] == "u2" {
            doc["email"] = json!("robert@example.com");
        }
    });

    let err = migrator.validate(CancellationToken::new()).await.unwrap_err();
    match err {
        MigrateError::SpotCheck {
            table, mismatches, ..
        } => {
            assert_eq!(table, "users");
            assert_eq!(mismatches.len(), 1);
            assert_eq!(mismatches[0].field, "email");
            assert_eq!(mismatches[0].actual, "bob@example.com");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_device_without_nested_structures() {
    let h = Harness::new();
    h.migrator(MigrationConfig::default())
        .run(CancellationToken::new())
        .await
        .unwrap();

    let rows = h
        .target
        .select(
            "devices",
            &["status", "mac", "identifier", "latitude", "longitude", "disconnected_at"],
            &[("id", SqlValue::Uuid(translate("d3")))],
        )
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![vec![
            SqlValue::Text("pending".into()),
            SqlValue::Text(String::new()),
            SqlValue::Text(String::new()),
            SqlValue::F64(0.0),
            SqlValue::F64(0.0),
            SqlValue::Null,
        ]]
    );
}

#[tokio::test]
async fn test_namespace_defaults() {
    let h = Harness::new();
    h.migrator(MigrationConfig::default())
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        h.cell("namespaces", "type", "tenant-b").await,
        SqlValue::Text("personal".into())
    );
    assert_eq!(
        h.cell("namespaces", "type", "tenant-a").await,
        SqlValue::Text("team".into())
    );
    for counter in [
        "devices_accepted_count",
        "devices_pending_count",
        "devices_rejected_count",
        "devices_removed_count",
    ] {
        assert_eq!(h.cell("namespaces", counter, "tenant-b").await, SqlValue::I64(0));
    }

    let roles = h
        .target
        .select(
            "memberships",
            &["role"],
            &[
                ("namespace_id", SqlValue::Uuid(translate("tenant-a"))),
                ("user_id", SqlValue::Uuid(translate("u3"))),
            ],
        )
        .await
        .unwrap();
    assert_eq!(roles, vec![vec![SqlValue::Text("observer".into())]]);
}

#[tokio::test]
async fn test_session_active_flag_and_type() {
    let h = Harness::new();
    h.migrator(MigrationConfig::default())
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(h.cell("sessions", "active", "s1").await, SqlValue::Bool(true));
    assert_eq!(h.cell("sessions", "active", "s2").await, SqlValue::Bool(false));
    assert_eq!(
        h.cell("sessions", "type", "s2").await,
        SqlValue::Text("shell".into())
    );
    assert_eq!(
        h.cell("users", "preferred_namespace_id", "u4").await,
        SqlValue::Uuid(translate("tenant-b"))
    );
    assert_eq!(h.cell("users", "preferred_namespace_id", "u1").await, SqlValue::Null);
}

#[tokio::test]
async fn test_session_event_triggers_suspended_and_restored() {
    let h = Harness::new();
    h.migrator(MigrationConfig::default())
        .run(CancellationToken::new())
        .await
        .unwrap();

    let executed = h.target.executed();
    assert_eq!(
        executed,
        vec![
            "ALTER TABLE \"session_events\" DISABLE TRIGGER ALL".to_string(),
            "ALTER TABLE \"session_events\" ENABLE TRIGGER ALL".to_string(),
        ]
    );
    assert!(!h.target.triggers_disabled("session_events"));
}

#[tokio::test]
async fn test_triggers_restored_when_event_load_fails() {
    let h = Harness::new();
    h.target.fail_inserts_after("session_events", 0);

    let err = h
        .migrator(MigrationConfig::default())
        .run(CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(&err, MigrateError::Job { table, .. } if table == "session_events"));
    assert!(!h.target.triggers_disabled("session_events"));
    assert_eq!(h.target.executed().len(), 2);
}

#[tokio::test]
async fn test_triggers_left_alone_when_disabled_in_config() {
    let h = Harness::new();
    let config = MigrationConfig {
        disable_triggers: Some(false),
        ..Default::default()
    };
    h.migrator(config).run(CancellationToken::new()).await.unwrap();
    assert!(h.target.executed().is_empty());
}

#[tokio::test]
async fn test_cancelled_run_writes_nothing() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h.migrator(MigrationConfig::default()).run(cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.exit_code(), 130);
    assert_eq!(h.target.write_count(), 0);

    let result = h
        .migrator(MigrationConfig::default())
        .run(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.rows_transferred, TOTAL_ROWS);
}

/// Cancels the run once the first batch of `table` has been written.
struct CancelAfterFirstBatch {
    inner: Arc<MemoryTarget>,
    table: &'static str,
    cancel: CancellationToken,
}

#[async_trait::async_trait]
impl TargetStore for CancelAfterFirstBatch {
    async fn bulk_insert(
        &self,
        table: &str,
        columns: &[&str],
        rows: Vec<Row>,
    ) -> fleet_migrate::Result<u64> {
        let written = self.inner.bulk_insert(table, columns, rows).await?;
        if table == self.table {
            self.cancel.cancel();
        }
        Ok(written)
    }

    async fn truncate(&self, table: &str, cascade: bool) -> fleet_migrate::Result<()> {
        self.inner.truncate(table, cascade).await
    }

    async fn select(
        &self,
        table: &str,
        columns: &[&str],
        filter: &[(&str, SqlValue)],
    ) -> fleet_migrate::Result<Vec<Row>> {
        self.inner.select(table, columns, filter).await
    }

    async fn count(&self, table: &str) -> fleet_migrate::Result<i64> {
        self.inner.count(table).await
    }

    async fn exec_raw(&self, sql: &str) -> fleet_migrate::Result<()> {
        self.inner.exec_raw(sql).await
    }

    fn target_type(&self) -> &str {
        "memory"
    }
}

#[tokio::test]
async fn test_cancel_mid_table_resumes_with_redo() {
    let h = Harness::new();
    let config = MigrationConfig {
        batch_size: Some(1),
        ..Default::default()
    };
    let cancel = CancellationToken::new();
    let target = CancelAfterFirstBatch {
        inner: h.target.clone(),
        table: "devices",
        cancel: cancel.clone(),
    };
    let migrator = Migrator::new(
        config.clone(),
        h.source.clone(),
        Arc::new(target),
        h.state.clone(),
    );

    let err = migrator.run(cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.exit_code(), 130);
    let devices = h.state.get("devices").await.unwrap().unwrap();
    assert_eq!(devices.status, TaskStatus::InProgress);
    assert_eq!(h.target.count("devices").await.unwrap(), 1);
    assert!(h.state.get("device_tags").await.unwrap().is_none());

    let result = h.migrator(config).run(CancellationToken::new()).await.unwrap();
    let devices = result.tables.iter().find(|t| t.table == "devices").unwrap();
    assert_eq!(devices.outcome, JobOutcome::Retried { rows: 3 });
    assert_eq!(h.target.count("devices").await.unwrap(), 3);
    assert_eq!(h.target.count("device_tags").await.unwrap(), 2);
}

#[tokio::test]
async fn test_state_write_failure_aborts_run() {
    let h = Harness::new();
    h.state.fail_writes_for("users");

    let err = h
        .migrator(MigrationConfig::default())
        .run(CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        MigrateError::Job { table, source }
            if table == "users" && matches!(**source, MigrateError::State(_))
    ));
    assert_eq!(err.exit_code(), 1);
    assert!(h.state.get("namespaces").await.unwrap().unwrap().is_completed());
    assert!(h.state.get("users").await.unwrap().is_none());
    assert!(h.state.get("tags").await.unwrap().is_none());
    assert_eq!(h.target.count("users").await.unwrap(), 0);
    assert_eq!(h.target.count("tags").await.unwrap(), 0);

    h.state.clear_faults();
    let result = h
        .migrator(MigrationConfig::default())
        .run(CancellationToken::new())
        .await
        .unwrap();
    let users = result.tables.iter().find(|t| t.table == "users").unwrap();
    assert_eq!(users.outcome, JobOutcome::Migrated { rows: 4 });
    assert_eq!(result.tables_skipped, 2);
}

#[tokio::test]
async fn test_status_and_validate_before_run() {
    let h = Harness::new();
    let migrator = h.migrator(MigrationConfig::default());

    let status = migrator.status().await.unwrap();
    assert_eq!(status.len(), 12);
    assert!(status.iter().all(|s| s.status == TaskStatus::Pending));
    assert_eq!(status[0].table_name, "system");

    let err = migrator.validate(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, MigrateError::State(_)));
    assert!(err.to_string().contains("system (pending)"));

    migrator.run(CancellationToken::new()).await.unwrap();
    let status = migrator.status().await.unwrap();
    assert!(status.iter().all(|s| s.is_completed()));
}

#[tokio::test]
async fn test_progress_updates_reach_channel() {
    let h = Harness::new();
    let (tx, mut rx) = mpsc::channel(64);
    let config = MigrationConfig {
        progress_interval: Some(1),
        ..Default::default()
    };
    h.migrator(config)
        .with_progress(tx)
        .run(CancellationToken::new())
        .await
        .unwrap();

    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    assert_eq!(updates.len(), 12);
    assert!(updates.contains(&ProgressUpdate {
        table: "session_events".to_string(),
        rows_loaded: 3,
    }));
}

#[tokio::test]
async fn test_run_from_jsonl_dump() {
    let dir = tempfile::tempdir().unwrap();
    for (name, docs) in collections() {
        let mut file = std::fs::File::create(dir.path().join(format!("{}.jsonl", name))).unwrap();
        for doc in docs {
            writeln!(file, "{}", serde_json::to_string(&doc).unwrap()).unwrap();
        }
        writeln!(file).unwrap();
    }

    let target = Arc::new(MemoryTarget::new());
    let migrator = Migrator::new(
        MigrationConfig::default(),
        Arc::new(JsonlSource::new(dir.path()).unwrap()),
        target.clone(),
        Arc::new(MemoryStateBackend::new()),
    );
    let result = migrator.run(CancellationToken::new()).await.unwrap();
    assert_eq!(result.rows_transferred, TOTAL_ROWS);
    assert_eq!(target.count("memberships").await.unwrap(), 6);
}

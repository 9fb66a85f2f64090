//! Post-migration validation.
//!
//! Three tiers, each a hard gate:
//!
//! - **Tier 1 (Count)**: every collection's document count equals its
//!   table's row count. Both counts are written to `migration_state`
//!   whether or not they match.
//! - **Tier 2 (Relationship)**: the number of elements of each fanned-out
//!   array, counted in the source by unwinding, equals the join table's row
//!   count.
//! - **Tier 3 (Spot check)**: the first N documents of key collections are
//!   compared field by field against their migrated rows.

pub mod spot;
pub mod types;

pub use types::{
    CountCheck, RelationshipCheck, SpotCheckSummary, ValidationReport, VerifyTier,
};

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tracing::{debug, info};

use crate::core::SqlValue;
use crate::error::{FieldMismatch, MigrateError, Result};
use crate::source::{collections, extjson, Filter, FindOptions, Stage};
use crate::state::StateBackend;
use crate::transfer::TransferContext;
use spot::{compare, SpotSpec, SPOT_CHECKS};

/// Collections whose documents map one-to-one onto table rows.
pub const COUNT_PAIRS: &[(&str, &str)] = &[
    (collections::SYSTEM, "system"),
    (collections::NAMESPACES, "namespaces"),
    (collections::USERS, "users"),
    (collections::TAGS, "tags"),
    (collections::API_KEYS, "api_keys"),
    (collections::PUBLIC_KEYS, "public_keys"),
    (collections::DEVICES, "devices"),
    (collections::SESSIONS, "sessions"),
    (collections::SESSIONS_EVENTS, "session_events"),
];

/// An embedded array that fans out into a join table.
pub struct Relationship {
    pub collection: &'static str,
    pub path: &'static str,
    pub table: &'static str,
}

impl Relationship {
    pub fn name(&self) -> String {
        format!("{}.{} -> {}", self.collection, self.path, self.table)
    }
}

pub const RELATIONSHIPS: &[Relationship] = &[
    Relationship {
        collection: collections::NAMESPACES,
        path: "members",
        table: "memberships",
    },
    Relationship {
        collection: collections::DEVICES,
        path: "tag_ids",
        table: "device_tags",
    },
    Relationship {
        collection: collections::PUBLIC_KEYS,
        path: "filter.tag_ids",
        table: "public_key_tags",
    },
];

fn tier_passed(tiers: &mut Vec<VerifyTier>, tier: VerifyTier) {
    debug!("Validation tier {} passed", tier);
    tiers.push(tier);
}

/// Runs the validation tiers against a finished migration.
pub struct Validator {
    ctx: TransferContext,
    state: Arc<dyn StateBackend>,
    sample_size: usize,
}

impl Validator {
    pub fn new(ctx: TransferContext, state: Arc<dyn StateBackend>, sample_size: usize) -> Self {
        Self {
            ctx,
            state,
            sample_size,
        }
    }

    /// Run all tiers, stopping at the first mismatch.
    pub async fn validate(&self) -> Result<ValidationReport> {
        let start = Instant::now();
        let mut tiers_passed = Vec::with_capacity(3);

        info!("Validation tier 1: row counts");
        let mut counts = Vec::with_capacity(COUNT_PAIRS.len());
        for (collection, table) in COUNT_PAIRS {
            counts.push(self.check_count(collection, table).await?);
        }
        tier_passed(&mut tiers_passed, VerifyTier::Count);

        info!("Validation tier 2: relationships");
        let mut relationships = Vec::with_capacity(RELATIONSHIPS.len());
        for relationship in RELATIONSHIPS {
            relationships.push(self.check_relationship(relationship).await?);
        }
        tier_passed(&mut tiers_passed, VerifyTier::Relationship);

        info!(
            "Validation tier 3: spot checks ({} documents per table)",
            self.sample_size
        );
        let mut spot_checks = Vec::with_capacity(SPOT_CHECKS.len());
        for check in SPOT_CHECKS {
            spot_checks.push(self.spot_check(check).await?);
        }
        tier_passed(&mut tiers_passed, VerifyTier::SpotCheck);

        let report = ValidationReport {
            tiers_passed,
            counts,
            relationships,
            spot_checks,
            duration_seconds: start.elapsed().as_secs_f64(),
        };
        info!(
            "Validation passed: {} tables counted, {} relationships, {} rows sampled",
            report.counts.len(),
            report.relationships.len(),
            report.rows_sampled()
        );
        Ok(report)
    }

    async fn check_count(&self, collection: &str, table: &str) -> Result<CountCheck> {
        let source_count = self
            .ctx
            .cancellable(self.ctx.source.count_documents(collection, &Filter::all()))
            .await?;
        let target_count = self.ctx.cancellable(self.ctx.target.count(table)).await?;
        self.state
            .record_counts(table, source_count, target_count)
            .await?;

        let check = CountCheck {
            collection: collection.to_string(),
            table: table.to_string(),
            source_count,
            target_count,
        };
        if !check.is_match() {
            return Err(MigrateError::CountMismatch {
                table: table.to_string(),
                source_count,
                target_count,
            });
        }
        debug!("{}: {} rows", table, target_count);
        Ok(check)
    }

    /// Count the elements at `path` across every document of `collection`.
    async fn unwound_count(&self, collection: &str, path: &str) -> Result<i64> {
        const FIELD: &str = "count";
        let pipeline = [Stage::Unwind(path.to_string()), Stage::Count(FIELD.to_string())];
        let mut cursor = self
            .ctx
            .cancellable(self.ctx.source.aggregate(collection, &pipeline))
            .await?;
        let first = self.ctx.cancellable(async { cursor.next().await.transpose() }).await?;
        match first {
            // Count emits nothing for an empty input.
            None => Ok(0),
            Some(doc) => {
                let value = doc.get(FIELD).cloned().unwrap_or_default();
                extjson::parse_int64(&value).map_err(|message| MigrateError::Decode {
                    collection: collection.to_string(),
                    message,
                })
            }
        }
    }

    async fn check_relationship(&self, relationship: &Relationship) -> Result<RelationshipCheck> {
        let source_count = self
            .unwound_count(relationship.collection, relationship.path)
            .await?;
        let target_count = self
            .ctx
            .cancellable(self.ctx.target.count(relationship.table))
            .await?;
        self.state
            .record_counts(relationship.table, source_count, target_count)
            .await?;

        let check = RelationshipCheck {
            relation: relationship.name(),
            table: relationship.table.to_string(),
            source_count,
            target_count,
        };
        if !check.is_match() {
            return Err(MigrateError::RelationshipMismatch {
                relation: check.relation,
                source_count,
                target_count,
            });
        }
        Ok(check)
    }

    async fn spot_check(&self, spec: &SpotSpec) -> Result<SpotCheckSummary> {
        let mut cursor = self
            .ctx
            .cancellable(self.ctx.source.find(
                spec.collection,
                &Filter::all(),
                FindOptions::limit(self.sample_size),
            ))
            .await?;

        let mut sampled = 0;
        loop {
            let next = self.ctx.cancellable(async { cursor.next().await.transpose() }).await?;
            let Some(doc) = next else {
                break;
            };
            let expected = (spec.expected)(doc)?;
            let rows = self
                .ctx
                .cancellable(self.ctx.target.select(
                    spec.table,
                    &expected.columns(),
                    &[("id", SqlValue::Uuid(expected.id))],
                ))
                .await?;

            let mismatches = match rows.first() {
                Some(row) => compare(&expected, row),
                None => vec![FieldMismatch {
                    field: "id".to_string(),
                    expected: expected.id.to_string(),
                    actual: "missing".to_string(),
                }],
            };
            if !mismatches.is_empty() {
                return Err(MigrateError::SpotCheck {
                    table: spec.table.to_string(),
                    id: expected.id.to_string(),
                    mismatches,
                });
            }
            sampled += 1;
        }

        debug!("{}: {} rows spot checked", spec.table, sampled);
        Ok(SpotCheckSummary {
            table: spec.table.to_string(),
            sampled,
        })
    }
}

//! Validation result types.

use serde::{Deserialize, Serialize};

/// Validation tier, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyTier {
    /// Collection document count vs table row count.
    Count,
    /// Aggregated fan-out count vs join table row count.
    Relationship,
    /// Field-by-field comparison of sampled documents.
    SpotCheck,
}

impl std::fmt::Display for VerifyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyTier::Count => write!(f, "count"),
            VerifyTier::Relationship => write!(f, "relationship"),
            VerifyTier::SpotCheck => write!(f, "spot_check"),
        }
    }
}

/// Result of one collection/table count comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountCheck {
    pub collection: String,
    pub table: String,
    pub source_count: i64,
    pub target_count: i64,
}

impl CountCheck {
    pub fn is_match(&self) -> bool {
        self.source_count == self.target_count
    }
}

/// Result of one relationship count comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipCheck {
    /// Human-readable name, e.g. `namespaces.members -> memberships`.
    pub relation: String,
    pub table: String,
    pub source_count: i64,
    pub target_count: i64,
}

impl RelationshipCheck {
    pub fn is_match(&self) -> bool {
        self.source_count == self.target_count
    }
}

/// How many documents of a collection were spot checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotCheckSummary {
    pub table: String,
    pub sampled: usize,
}

/// Everything a successful validation checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Tiers that passed, in the order they ran.
    pub tiers_passed: Vec<VerifyTier>,
    pub counts: Vec<CountCheck>,
    pub relationships: Vec<RelationshipCheck>,
    pub spot_checks: Vec<SpotCheckSummary>,
    pub duration_seconds: f64,
}

impl ValidationReport {
    /// Number of sampled documents across all tables.
    pub fn rows_sampled(&self) -> usize {
        self.spot_checks.iter().map(|s| s.sampled).sum()
    }
}

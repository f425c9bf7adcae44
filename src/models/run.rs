use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical reconcile run status values
pub mod run_status {
    pub const SUCCEEDED: &str = "succeeded";
    pub const FAILED: &str = "failed";
}

/// PassSummary reports what one successful reconciliation pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub run_id: String,
    pub inserted: usize,
    pub updated: usize,
    pub reactivated: usize,
    pub refreshed: usize,
    pub retired: usize,
    pub skipped: usize,
}

impl std::fmt::Display for PassSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} inserted, {} updated ({} reactivated), {} unchanged, {} retired, {} skipped",
            self.inserted, self.updated, self.reactivated, self.refreshed, self.retired, self.skipped
        )
    }
}

/// ReconcileRun is the history row written for every pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileRun {
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub inserted: i64,
    pub updated: i64,
    pub reactivated: i64,
    pub refreshed: i64,
    pub retired: i64,
    pub skipped: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ReconcileRun {
    pub fn succeeded(summary: &PassSummary, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        Self {
            id: summary.run_id.clone(),
            status: run_status::SUCCEEDED.to_string(),
            phase: None,
            error: None,
            inserted: summary.inserted as i64,
            updated: summary.updated as i64,
            reactivated: summary.reactivated as i64,
            refreshed: summary.refreshed as i64,
            retired: summary.retired as i64,
            skipped: summary.skipped as i64,
            started_at,
            finished_at,
        }
    }

    pub fn failed(
        run_id: &str,
        phase: &str,
        error: String,
        skipped: usize,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: run_id.to_string(),
            status: run_status::FAILED.to_string(),
            phase: Some(phase.to_string()),
            error: Some(error),
            inserted: 0,
            updated: 0,
            reactivated: 0,
            refreshed: 0,
            retired: 0,
            skipped: skipped as i64,
            started_at,
            finished_at,
        }
    }
}

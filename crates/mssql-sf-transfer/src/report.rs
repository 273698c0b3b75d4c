//! Per-mapping results and the whole-run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransferError};

/// Outcome of one table mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Success,
    Failed,
}

/// Result of transferring one table mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    /// Mapping display name, `source -> target`.
    pub mapping: String,

    pub status: TransferStatus,

    /// Rows written and committed to the target. On an atomic failure this
    /// is 0; on a non-atomic failure it counts the batches that committed
    /// before the error.
    pub rows_transferred: u64,

    /// Stable error kind label, set on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    /// Human-readable error detail, set on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Wall-clock seconds spent on this mapping.
    pub duration_secs: f64,
}

impl TransferResult {
    pub fn success(mapping: String, rows: u64, duration_secs: f64) -> Self {
        Self {
            mapping,
            status: TransferStatus::Success,
            rows_transferred: rows,
            error_kind: None,
            error: None,
            duration_secs,
        }
    }

    pub fn failure(
        mapping: String,
        rows_committed: u64,
        duration_secs: f64,
        err: &TransferError,
    ) -> Self {
        Self {
            mapping,
            status: TransferStatus::Failed,
            rows_transferred: rows_committed,
            error_kind: Some(err.kind().to_string()),
            error: Some(err.to_string()),
            duration_secs,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TransferStatus::Success
    }
}

/// Aggregated report for one run, with exactly one entry per configured
/// mapping. Consumed by the notifier and by `--output-json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<TransferResult>,
}

impl RunReport {
    pub fn new(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        results: Vec<TransferResult>,
    ) -> Self {
        Self {
            started_at,
            finished_at,
            results,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(TransferResult::is_success)
    }

    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.succeeded_count()
    }

    pub fn total_rows(&self) -> u64 {
        self.results.iter().map(|r| r.rows_transferred).sum()
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0
    }

    /// Human-readable summary, used as the notification body and printed by
    /// the CLI.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Transfer run {} .. {} ({:.1}s)\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.duration_secs()
        ));
        out.push_str(&format!(
            "Tables: {} succeeded, {} failed. Rows: {}\n",
            self.succeeded_count(),
            self.failed_count(),
            self.total_rows()
        ));
        for result in &self.results {
            match result.status {
                TransferStatus::Success => {
                    out.push_str(&format!(
                        "  OK     {} ({} rows, {:.1}s)\n",
                        result.mapping, result.rows_transferred, result.duration_secs
                    ));
                }
                TransferStatus::Failed => {
                    out.push_str(&format!(
                        "  FAILED {} ({} rows committed, {:.1}s): [{}] {}\n",
                        result.mapping,
                        result.rows_transferred,
                        result.duration_secs,
                        result.error_kind.as_deref().unwrap_or("unknown"),
                        result.error.as_deref().unwrap_or("no detail")
                    ));
                }
            }
        }
        out
    }

    /// Serialize the report as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

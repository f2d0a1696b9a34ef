//! Per-repository outcomes and the run summary

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::release::RepositoryId;
use crate::store::StoreError;

/// One asset that reached its final path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadedAsset {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
    pub checksum_verified: bool,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoMatchReason {
    /// The pinned tag is not in the fetched release list
    PinNotFound { target: String },
    /// The selected release has no asset passing the pattern list
    NoAssetsMatched { version: String },
    /// Every fetched release was filtered out by the prerelease policy
    NoEligibleRelease,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepositoryOutcome {
    Downloaded {
        version: String,
        assets: Vec<DownloadedAsset>,
    },
    /// A newer release was recorded without downloading (monitor-only mode)
    Detected { version: String },
    SkippedNotNewer {
        candidate: String,
        current: Option<String>,
    },
    SkippedNoMatch { reason: NoMatchReason },
    SkippedBudgetExhausted,
    Failed {
        reason: String,
        /// Assets already on disk when a sibling failed
        #[serde(skip_serializing_if = "Vec::is_empty")]
        kept_assets: Vec<DownloadedAsset>,
    },
}

impl RepositoryOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        RepositoryOutcome::Failed {
            reason: reason.into(),
            kept_assets: Vec::new(),
        }
    }

    /// Number of assets downloaded, zero for anything but `Downloaded`
    pub fn downloaded_count(&self) -> usize {
        match self {
            RepositoryOutcome::Downloaded { assets, .. } => assets.len(),
            _ => 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RepositoryOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryReport {
    pub repository: RepositoryId,
    #[serde(flatten)]
    pub outcome: RepositoryOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryTotals {
    pub downloaded: usize,
    pub detected: usize,
    pub skipped: usize,
    pub failed: usize,
    pub assets: usize,
}

/// Aggregate result of one coordinator run, in input order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub backend: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub totals: SummaryTotals,
    pub repositories: Vec<RepositoryReport>,
}

impl RunSummary {
    pub fn new(
        backend: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        repositories: Vec<RepositoryReport>,
    ) -> Self {
        let mut totals = SummaryTotals::default();
        for report in &repositories {
            match &report.outcome {
                RepositoryOutcome::Downloaded { assets, .. } => {
                    totals.downloaded += 1;
                    totals.assets += assets.len();
                }
                RepositoryOutcome::Detected { .. } => totals.detected += 1,
                RepositoryOutcome::Failed { .. } => totals.failed += 1,
                RepositoryOutcome::SkippedNotNewer { .. }
                | RepositoryOutcome::SkippedNoMatch { .. }
                | RepositoryOutcome::SkippedBudgetExhausted => totals.skipped += 1,
            }
        }

        Self {
            backend: backend.to_string(),
            started_at,
            finished_at,
            totals,
            repositories,
        }
    }

    pub fn outcome(&self, repository: &RepositoryId) -> Option<&RepositoryOutcome> {
        self.repositories
            .iter()
            .find(|r| &r.repository == repository)
            .map(|r| &r.outcome)
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    /// Nothing could be evaluated
    #[error("version store ({backend}) is unreachable: {source}")]
    StoreUnreachable {
        backend: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("invalid coordinator options: {0}")]
    InvalidOptions(String),
}

//! End-of-run report.

use serde::{Deserialize, Serialize};

use hrsync_core::{ArtifactKind, InstitutionId};

use crate::progress::{Summary, SyncResult, SyncStatus};

/// Per-institution breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionReport {
    pub id: InstitutionId,
    pub name: String,
    pub summary: Summary,
    /// Set when the institution could not be processed at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub artifact: ArtifactKind,
    /// Run-wide totals, including anything carried over from a resumed
    /// checkpoint.
    pub summary: Summary,
    /// Results for subjects processed in this invocation only.
    pub results: Vec<SyncResult>,
    pub institutions: Vec<InstitutionReport>,
    /// Subjects already resolved by an earlier run when resuming.
    #[serde(default)]
    pub resumed_from: usize,
    #[serde(default)]
    pub cancelled: bool,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = &SyncResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, SyncStatus::Failed | SyncStatus::Partial))
    }

    pub fn institution_errors(&self) -> impl Iterator<Item = &InstitutionReport> {
        self.institutions.iter().filter(|i| i.error.is_some())
    }

    /// A run is clean when nothing failed and nothing was cut short.
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.summary.failed == 0 && self.institution_errors().next().is_none()
    }
}

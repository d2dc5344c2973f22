//! Checkpoint store: resumable progress markers.
//!
//! Persists one JSON document per artifact family at
//! `<data_dir>/checkpoints/<artifact>.json`. Writes use the atomic `.tmp` +
//! rename pattern. `lastOffset` only ever covers fully resolved employees.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hrsync_core::{ArtifactKind, InstitutionId};

use crate::error::{io_err, SyncError};
use crate::progress::Summary;

/// On-disk checkpoint payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub artifact: ArtifactKind,
    /// Selection the run was started with; resume must match it.
    #[serde(default)]
    pub scope: String,
    /// Institution currently (or last) being processed.
    pub institution_id: Option<InstitutionId>,
    /// Employees of `institution_id` already resolved.
    pub last_offset: usize,
    pub total_processed: usize,
    /// Run-wide summary up to this point.
    pub summary: Summary,
    /// Summary for `institution_id` up to `last_offset`.
    #[serde(default)]
    pub institution_summary: Summary,
    #[serde(default)]
    pub completed_institutions: Vec<InstitutionId>,
    #[serde(default)]
    pub finished: bool,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    pub fn start(artifact: ArtifactKind, scope: impl Into<String>) -> Self {
        Self {
            artifact,
            scope: scope.into(),
            institution_id: None,
            last_offset: 0,
            total_processed: 0,
            summary: Summary::default(),
            institution_summary: Summary::default(),
            completed_institutions: Vec::new(),
            finished: false,
            timestamp: Utc::now(),
        }
    }

    pub fn is_completed(&self, id: &InstitutionId) -> bool {
        self.completed_institutions.contains(id)
    }

    /// Where to start inside `id`: the saved offset if it is the in-progress
    /// institution, otherwise zero.
    pub fn offset_for(&self, id: &InstitutionId) -> usize {
        if self.institution_id.as_ref() == Some(id) && !self.is_completed(id) {
            self.last_offset
        } else {
            0
        }
    }
}

/// `<data_dir>/checkpoints/`
pub fn checkpoints_dir_at(data_dir: &Path) -> PathBuf {
    data_dir.join("checkpoints")
}

/// `<data_dir>/checkpoints/<artifact>.json`
pub fn checkpoint_path_at(data_dir: &Path, artifact: ArtifactKind) -> PathBuf {
    checkpoints_dir_at(data_dir).join(format!("{}.json", artifact.as_str()))
}

/// Load the checkpoint for `artifact`, or `None` if there is none yet.
pub fn load_at(data_dir: &Path, artifact: ArtifactKind) -> Result<Option<Checkpoint>, SyncError> {
    let path = checkpoint_path_at(data_dir, artifact);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Every checkpoint present, in [`ArtifactKind::ALL`] order.
pub fn load_all_at(data_dir: &Path) -> Result<Vec<Checkpoint>, SyncError> {
    let mut out = Vec::new();
    for artifact in ArtifactKind::ALL {
        if let Some(cp) = load_at(data_dir, artifact)? {
            out.push(cp);
        }
    }
    Ok(out)
}

/// Save atomically: write `<path>.tmp`, then rename.
pub fn save_at(data_dir: &Path, checkpoint: &Checkpoint) -> Result<(), SyncError> {
    let path = checkpoint_path_at(data_dir, checkpoint.artifact);
    let Some(dir) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("invalid checkpoint path"),
        ));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(checkpoint)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

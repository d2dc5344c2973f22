//! Error types for hrsync-sync.
//!
//! [`SyncError`] is reserved for failures that abort a whole run. Anything
//! that goes wrong for a single employee is an [`ArtifactError`] and ends up
//! as a `failed` result record instead.

use std::path::PathBuf;

use thiserror::Error;

use hrsync_core::{DirectoryError, InstitutionId};
use hrsync_hrims::{FetchError, NormalizeError};

use crate::unit::TransitionError;

/// Run-level (setup) errors. These abort the run with a non-zero exit.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("institution '{id}' not found")]
    InstitutionNotFound { id: InstitutionId },

    #[error("institution '{id}' has no employees to sync")]
    NoEmployees { id: InstitutionId },

    #[error("no institutions match the selection")]
    NoInstitutions,

    /// The "after institution X" boundary does not exist.
    #[error("boundary institution '{name}' not found; refusing to sync the full range")]
    BoundaryNotFound { name: String },

    /// The "after institution X" boundary matches more than one institution.
    #[error("boundary institution '{name}' is ambiguous: matches {}", .matches.join(", "))]
    AmbiguousBoundary { name: String, matches: Vec<String> },

    /// `--resume` against a checkpoint written for a different selection.
    #[error("checkpoint was written for '{found}', not '{expected}'; rerun without resume or with the original selection")]
    CheckpointScope { expected: String, found: String },

    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Object store write failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("digest mismatch for '{key}': wrote {expected}, read back {actual}")]
    DigestMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("invalid object key '{key}'")]
    InvalidKey { key: String },

    #[error("object store unavailable: {0}")]
    Unavailable(String),
}

/// Why a single employee-artifact unit did not reach `success`.
///
/// `Display` is what ends up in the result record's `message`.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("Storage write failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Reference update failed: {0}")]
    Reference(#[from] DirectoryError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn storage_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.into(),
        source,
    }
}

//! Error types for hrsync-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{EmployeeId, InstitutionId};

/// All errors that can arise from directory (relational store) operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Underlying I/O failure, with the path that was being touched.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse institution file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("institution '{id}' not found")]
    InstitutionNotFound { id: InstitutionId },

    /// The id is not a plain file name (path separators, `..`, absolute).
    #[error("invalid institution id '{id}'")]
    InvalidId { id: String },

    #[error("employee '{employee}' not found in institution '{institution}'")]
    EmployeeNotFound {
        institution: InstitutionId,
        employee: EmployeeId,
    },
}

/// Errors from loading or validating process configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DirectoryError {
    DirectoryError::Io {
        path: path.into(),
        source,
    }
}

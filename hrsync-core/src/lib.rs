//! hrsync core library: domain types, directory store, configuration, errors.
//!
//! - [`types`]: institutions, employees, certificates and document kinds
//! - [`directory`]: the [`Directory`] seam plus the YAML-backed store
//! - [`config`]: process configuration resolved once at start
//! - [`error`]: [`DirectoryError`], [`ConfigError`]

pub mod config;
pub mod directory;
pub mod error;
pub mod types;

pub use config::{Config, HrimsConfig, PipelineConfig, ServerConfig, StorageConfig};
pub use directory::{Directory, YamlDirectory};
pub use error::{ConfigError, DirectoryError};
pub use types::{
    ArtifactKind, Certificate, CertificateType, DocumentKind, DocumentRefs, Employee, EmployeeId,
    Institution, InstitutionId, SearchKey,
};

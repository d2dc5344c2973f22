//! # hrsync-sync
//!
//! The sync pipeline proper: idempotency guard, object store writer,
//! progress reporting, bounded retry, checkpoints, and the orchestrator that
//! ties them together.
//!
//! Build a [`Pipeline`] (usually via [`Pipeline::from_config`]) and call
//! [`Pipeline::run`] with [`RunOptions`] and a [`ProgressSink`].

pub mod checkpoint;
pub mod enumerate;
pub mod error;
pub mod guard;
pub mod object_store;
pub mod pipeline;
mod processor;
pub mod progress;
pub mod report;
pub mod retry;
pub mod unit;

pub use checkpoint::Checkpoint;
pub use enumerate::{Scope, Selection};
pub use error::{ArtifactError, StorageError, SyncError};
pub use object_store::{FsObjectStore, MemoryObjectStore, ObjectStore, StoredObject};
pub use pipeline::{CancelFlag, Pipeline, RunOptions, Settings};
pub use processor::Outcome;
pub use progress::{
    FnSink, NullSink, ProgressEvent, ProgressReporter, ProgressSink, Summary, SyncResult,
    SyncStatus,
};
pub use report::{InstitutionReport, RunReport};
pub use retry::RetryPolicy;

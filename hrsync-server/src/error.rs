use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use hrsync_core::{ArtifactKind, DirectoryError};
use hrsync_sync::SyncError;

/// Error surface for the HTTP trigger, the follow-up queue and the
/// trigger client.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Sync(#[from] SyncError),

    #[error("config error: {0}")]
    Config(#[from] hrsync_core::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("a {artifact} sync is already running")]
    Busy { artifact: ArtifactKind },

    #[error("no {artifact} checkpoint recorded")]
    NoCheckpoint { artifact: ArtifactKind },

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("server protocol error: {0}")]
    Protocol(String),

    /// The server answered the trigger client with an error.
    #[error("server returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("cannot reach sync server at {url}: {message}")]
    Unreachable { url: String, message: String },
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServerError::Busy { .. } => StatusCode::CONFLICT,
            ServerError::NoCheckpoint { .. } => StatusCode::NOT_FOUND,
            ServerError::Sync(err) => match err {
                SyncError::InstitutionNotFound { .. }
                | SyncError::BoundaryNotFound { .. }
                | SyncError::NoInstitutions => StatusCode::NOT_FOUND,
                SyncError::NoEmployees { .. }
                | SyncError::AmbiguousBoundary { .. }
                | SyncError::CheckpointScope { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                SyncError::Directory(DirectoryError::InvalidId { .. }) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        if code.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (code, Json(body)).into_response()
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ServerError {
    ServerError::Io {
        path: path.into(),
        source,
    }
}

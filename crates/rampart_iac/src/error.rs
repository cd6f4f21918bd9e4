//! Error types for IaC module.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that can occur while generating fields, emitting artifacts or
/// handing them to a runner.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Invalid generated fields record {path}: {message}")]
    InvalidRecord { path: PathBuf, message: String },

    #[error("Project at {0} has no project_id")]
    MissingProjectId(String),

    #[error("Two artifact units are named '{0}'")]
    DuplicateUnit(String),

    #[error("Unknown output format: {0}")]
    UnknownFormat(String),

    #[error("Artifact emission failed: {0}")]
    EmissionFailed(String),

    #[error("Runner error: {0}")]
    Runner(String),

    #[error("Document error: {0}")]
    Spec(#[from] rampart_spec::SpecError),

    #[error(transparent)]
    Merge(#[from] rampart_spec::MergeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

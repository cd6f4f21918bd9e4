//! Error types for the document crate.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for spec operations.
pub type SpecResult<T> = Result<T, SpecError>;

/// Errors that can occur while loading documents and schemas.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Document not found at path: {0}")]
    NotFound(PathBuf),

    #[error("Document {0} must decode to a mapping")]
    NotAMapping(PathBuf),

    #[error("Invalid document format in file {path}: {message}")]
    InvalidFormat { path: PathBuf, message: String },

    #[error("Invalid schema {name}: {message}")]
    InvalidSchema { name: String, message: String },

    #[error("Unknown schema: {0}")]
    UnknownSchema(String),

    #[error("Merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the strict merge variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("MergeTypeConflict at '{path}': cannot merge {overlay} over {base}")]
    TypeConflict {
        path: String,
        base: String,
        overlay: String,
    },
}

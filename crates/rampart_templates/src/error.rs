//! Error types for import resolution and templates.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur while expanding imports and templates.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("ImportCycle: {chain}")]
    ImportCycle { chain: String },

    #[error("UnresolvedPlaceholder: '{token}' in {path} has no matching data key")]
    UnresolvedPlaceholder { token: String, path: PathBuf },

    #[error("UnusedParameter: data key '{key}' matches no placeholder in {path}")]
    UnusedParameter { key: String, path: PathBuf },

    #[error("Placeholder '{token}' in {path} is embedded in text but its value is {kind}")]
    NonScalarEmbedding {
        token: String,
        path: PathBuf,
        kind: String,
    },

    #[error("Invalid import in {path}: {message}")]
    InvalidImport { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document error: {0}")]
    Spec(#[from] rampart_spec::SpecError),
}

//! Error types for the core module.

use std::fmt::Display;
use std::path::PathBuf;

use rampart_policy::PolicyViolation;
use thiserror::Error;

use crate::report::Diagnostic;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can abort a pipeline run.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid settings file {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("{} validation error(s):\n{}", .0.len(), lines(.0))]
    Validation(Vec<Diagnostic>),

    #[error("{} policy violation(s):\n{}", .0.len(), lines(.0))]
    PolicyViolations(Vec<PolicyViolation>),

    #[error(transparent)]
    Template(#[from] rampart_templates::TemplateError),

    #[error(transparent)]
    Spec(#[from] rampart_spec::SpecError),

    #[error(transparent)]
    Policy(#[from] rampart_policy::PolicyError),

    #[error(transparent)]
    Iac(#[from] rampart_iac::IacError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn lines<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| format!("  - {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

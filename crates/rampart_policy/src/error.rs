//! Error types for policy module.

use thiserror::Error;

/// Result type alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors that can occur while configuring or running policy checks.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Unknown policy rule: {0}")]
    UnknownRule(String),

    #[error("Policy rule '{0}' is mandatory and cannot be disabled")]
    MandatoryRule(String),

    #[error("Invalid policy configuration: {0}")]
    InvalidConfiguration(String),
}

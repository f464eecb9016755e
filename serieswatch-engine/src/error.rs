use thiserror::Error;

/// Result alias for run-level operations.
pub type RunResult<T> = Result<T, RunError>;

/// Errors that abort a whole run before any subscription is processed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("subscription store unavailable: {0}")]
    Systemic(String),
}

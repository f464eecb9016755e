use std::time::Duration;

use thiserror::Error;

/// Result alias for series source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Failures reported by a [`crate::SeriesSource`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The provider does not know the series.
    #[error("series {0} not found")]
    NotFound(String),
    /// The series exists but has no observations yet.
    #[error("series {0} has no observations")]
    EmptyResult(String),
    #[error("transient provider failure: {0}")]
    Transient(String),
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
}

impl SourceError {
    /// Whether repeating the call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Transient(_) | SourceError::Timeout(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transient(value.to_string())
    }
}

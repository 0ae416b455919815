use std::time::Duration;

use crate::query::QueryError;

/// Failure reported by a backend collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("request cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

/// Error returned from running or compiling a job.
///
/// Only [`JobError::InvalidPlan`] and [`JobError::Query`] are fatal. Backend
/// failures are folded into alerts by the fan-out combinators as long as at
/// least one sibling succeeded.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("{backend} failed: {source}")]
    Backend {
        backend: &'static str,
        #[source]
        source: BackendError,
    },
    #[error("search cancelled")]
    Cancelled,
    #[error("search exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
    #[error("{}", format_multiple(.0))]
    Multiple(Vec<JobError>),
    #[error("search task failed: {0}")]
    Task(String),
}

fn format_multiple(errors: &[JobError]) -> String {
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("{} errors occurred: {}", errors.len(), messages.join("; "))
}

impl JobError {
    pub fn invalid_plan(msg: impl Into<String>) -> Self {
        Self::InvalidPlan(msg.into())
    }

    pub fn backend(backend: &'static str, source: BackendError) -> Self {
        match source {
            BackendError::Cancelled => Self::Cancelled,
            source => Self::Backend { backend, source },
        }
    }

    /// Errors that must abort the whole request.
    pub fn is_fatal(&self) -> bool {
        match self {
            JobError::InvalidPlan(_) | JobError::Query(_) => true,
            JobError::Multiple(errors) => errors.iter().any(JobError::is_fatal),
            _ => false,
        }
    }

    /// Errors caused only by cancellation or an expired deadline.
    pub fn is_cancellation(&self) -> bool {
        match self {
            JobError::Cancelled | JobError::DeadlineExceeded(_) => true,
            JobError::Multiple(errors) => errors.iter().all(JobError::is_cancellation),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, JobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_backend_errors_become_cancellation() {
        let err = JobError::backend("searcher", BackendError::Cancelled);
        assert!(err.is_cancellation());
        assert!(!err.is_fatal());
    }

    #[test]
    fn multiple_errors_classification() {
        let err = JobError::Multiple(vec![JobError::Cancelled, JobError::Cancelled]);
        assert!(err.is_cancellation());

        let err = JobError::Multiple(vec![
            JobError::Cancelled,
            JobError::backend("zoekt", BackendError::Unavailable("down".into())),
        ]);
        assert!(!err.is_cancellation());
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "2 errors occurred: search cancelled; zoekt failed: backend unavailable: down"
        );

        let err = JobError::Multiple(vec![JobError::invalid_plan("bad")]);
        assert!(err.is_fatal());
    }
}

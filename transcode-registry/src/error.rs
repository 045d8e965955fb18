//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Stale report for job {job_id}: {reason}")]
    StaleReport { job_id: String, reason: String },

    #[error("No transcoder capacity available: {0}")]
    DispatchUnavailable(String),

    #[error("Transcoder unreachable: {0}")]
    Unreachable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidStateTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn stale(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StaleReport {
            job_id: job_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error should be reported back to the caller as a client error
    /// rather than an internal failure of the registry.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::NotFound { .. }
                | Self::InvalidStateTransition { .. }
                | Self::StaleReport { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(Error::validation("input is required").is_client_error());
        assert!(Error::not_found("TranscodeJob", "abc").is_client_error());
        assert!(Error::invalid_transition("success", "processing").is_client_error());
        assert!(!Error::DispatchUnavailable("busy".into()).is_client_error());
        assert!(!Error::Database("locked".into()).is_client_error());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::invalid_transition("failed", "accepted");
        assert_eq!(
            err.to_string(),
            "Invalid state transition: cannot transition from failed to accepted"
        );
        let err = Error::not_found("TranscodeJob", "42");
        assert_eq!(err.to_string(), "Entity not found: TranscodeJob with id 42");
    }
}

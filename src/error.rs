//! # Error Types
//!
//! Structured error taxonomy for batch processing.
//!
//! [`MailroomError`] is the crate-wide error used by stores, queues, hooks and
//! translators. [`BatchError`] is what the transaction coordinator reports to the
//! caller that triggered a batch, and records which phase failed so the caller can
//! decide whether to refresh assets, retry, or give up.

use thiserror::Error;

/// PostgreSQL SQLSTATE codes the coordinator reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PgErrorCode;

impl PgErrorCode {
    /// Unique violation - Code 23505
    ///
    /// Two concurrent batches inserting the same row. Safe to retry the batch.
    pub const UNIQUE_VIOLATION: &'static str = "23505";

    /// Foreign key violation - Code 23503
    pub const FOREIGN_KEY_VIOLATION: &'static str = "23503";

    /// Serialization failure - Code 40001
    pub const SERIALIZATION_FAILURE: &'static str = "40001";

    /// Deadlock detected - Code 40P01
    pub const DEADLOCK_DETECTED: &'static str = "40P01";

    /// Whether a SQLSTATE code represents a race that a fresh transaction can win
    pub fn is_transient(code: &str) -> bool {
        matches!(
            code,
            Self::UNIQUE_VIOLATION | Self::SERIALIZATION_FAILURE | Self::DEADLOCK_DETECTED
        )
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MailroomError {
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: Option<String>,
    },
    #[error("Queue error: {0}")]
    Queue(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Registry error: {0}")]
    Registry(String),
    #[error("Translation error: {0}")]
    Translation(String),
    #[error("Hook {hook} failed: {message}")]
    Hook { hook: String, message: String },
    #[error("Scheduling error: {0}")]
    Scheduling(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MailroomError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            code: None,
        }
    }

    /// Database error carrying a SQLSTATE, as produced by a failed statement
    pub fn database_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    pub fn hook(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            hook: hook.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the whole batch with a fresh transaction may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database {
                code: Some(code), ..
            } => PgErrorCode::is_transient(code),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for MailroomError {
    fn from(err: sqlx::Error) -> Self {
        let code = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|c| c.into_owned());
        MailroomError::Database {
            message: err.to_string(),
            code,
        }
    }
}

impl From<redis::RedisError> for MailroomError {
    fn from(err: redis::RedisError) -> Self {
        MailroomError::Queue(err.to_string())
    }
}

impl From<serde_json::Error> for MailroomError {
    fn from(err: serde_json::Error) -> Self {
        MailroomError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MailroomError>;

/// Failure of a batch as seen by whatever triggered it
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BatchError {
    /// A translator rejected an event; nothing was written
    #[error("Translation failed: {0}")]
    Translation(MailroomError),
    /// The batch transaction could not be opened
    #[error("Unable to begin transaction: {0}")]
    Begin(MailroomError),
    /// A pre-commit hook failed; the transaction was rolled back
    #[error("Pre-commit hook failed: {0}")]
    PreCommit(MailroomError),
    /// The transaction failed to commit; no post-commit hooks ran
    #[error("Commit failed: {0}")]
    Commit(MailroomError),
    #[error("Batch failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<BatchError>,
    },
}

impl BatchError {
    /// The underlying error for the failed phase
    pub fn source_error(&self) -> &MailroomError {
        match self {
            Self::Translation(e) | Self::Begin(e) | Self::PreCommit(e) | Self::Commit(e) => e,
            Self::RetriesExhausted { last, .. } => last.source_error(),
        }
    }

    /// Transient database races during pre-commit or commit are retried from scratch
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PreCommit(e) | Self::Commit(e) | Self::Begin(e) => e.is_transient(),
            Self::Translation(_) | Self::RetriesExhausted { .. } => false,
        }
    }
}

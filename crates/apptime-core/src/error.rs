//! Error types for apptime-core.

use std::path::PathBuf;

/// All errors the session-lifecycle engine can produce.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("repository error: {context}: {source}")]
    Repository {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    /// An `archive` call found no `ActiveSession` row for the program.
    /// Logged and recovered, not a panic: the caller clears the
    /// Registry entry's PID set to bring it back in line with
    /// persistence.
    #[error("no active session row for {0}, cannot archive")]
    MissingActiveSession(String),

    #[error("config file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("config write failed: {path}: {source}")]
    ConfigWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not resolve a config directory")]
    NoConfigDir,

    #[error("program not found: {0}")]
    ProgramNotFound(String),

    #[error("a program named {0} is already tracked")]
    ProgramAlreadyTracked(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Whether `err` represents a unique-constraint violation: a stale
/// `ActiveSession` row left behind by a prior crash, which the caller
/// should adopt rather than treat as a hard failure.
pub fn is_unique_violation(err: &CoreError) -> bool {
    matches!(
        err,
        CoreError::Repository {
            source: rusqlite::Error::SqliteFailure(code, _),
            ..
        } if code.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

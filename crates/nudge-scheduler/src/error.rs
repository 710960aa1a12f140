use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Could not create the ledger's parent directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation that needs the run-loop was called while stopped.
    #[error("Scheduler is not running")]
    NotRunning,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobsError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Job '{0}' not found")]
    JobNotFound(String),

    #[error("Job '{0}' is disabled: {1}")]
    JobDisabled(String, String),

    #[error("Curve error: {0}")]
    CurveError(String),

    #[error("Schedule error: {0}")]
    ScheduleError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Service is shutting down")]
    ShuttingDown,

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, JobsError>;

impl<T> From<std::sync::PoisonError<T>> for JobsError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for JobsError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<rusqlite::Error> for JobsError {
    fn from(err: rusqlite::Error) -> Self {
        Self::BackendError(err.to_string())
    }
}

use crate::domain::clock::ClockFormatError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Clock error: {0}")]
    Clock(#[from] ClockFormatError),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

//! Error handling for Tune-Fetch

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Cannot determine what to download. Fatal to the session.
    #[error("{0}")]
    Resolution(String),

    /// One item failed. Recovered by the worker that claimed it.
    #[error("failed to fetch {item}: {message}")]
    Fetch { item: String, message: String },

    /// Output directory could not be prepared. Fatal to the session.
    #[error("cannot prepare output directory: {0}")]
    Setup(String),

    /// A worker died instead of returning. Fatal to the session.
    #[error("Unexpected error: {0}")]
    Worker(String),

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("a download session is already active")]
    SessionActive,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    pub fn fetch(item: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Fetch {
            item: item.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

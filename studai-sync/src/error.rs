//! Error types for the StudAI sync layer
//!
//! All errors use thiserror for structured error handling.
//! Network and storage failures on the optimistic write paths are absorbed
//! by the coordinator; what reaches a caller is a write that could not even
//! be queued, or a failure of an explicit administrative call.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid note id: {0}")]
    InvalidNoteId(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Generic(String),
}

impl serde::Serialize for SyncError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

//! Error types for rehearsal-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Guarded no-op conditions (no song, concurrent play, transition in flight) are
//! not errors: those commands return `Ok` without effect.

use thiserror::Error;

/// Main error type for rehearsal-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio graph host failures (node creation, routing, source start)
    #[error("Audio graph error: {0}")]
    Graph(String),

    /// Command parameter out of its allowed range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Unknown song, track, or section
    #[error("Not found: {0}")]
    NotFound(String),

    /// Session manifest errors
    #[error("Session error: {0}")]
    Session(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the shared crate
    #[error(transparent)]
    Common(#[from] rehearsal_common::Error),
}

/// Convenience Result type using rehearsal-player Error
pub type Result<T> = std::result::Result<T, Error>;

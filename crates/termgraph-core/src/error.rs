//! Error types for Termgraph

use thiserror::Error;

/// Result type alias using Termgraph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Termgraph error types
///
/// Only configuration problems and programmer errors surface as `Error`.
/// A text failing validation, or an extractor finding nothing, is a normal
/// outcome carried in the result structs, never an error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vocabulary source '{source_name}' is malformed: {detail}")]
    Vocabulary { source_name: String, detail: String },

    #[error("Edge references unknown node: {0}")]
    UnknownNode(String),

    #[error("Invalid graph document: {0}")]
    InvalidDocument(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a malformed vocabulary source
    pub fn vocabulary(source_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Vocabulary {
            source_name: source_name.into(),
            detail: detail.into(),
        }
    }
}

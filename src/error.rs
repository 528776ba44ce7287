// Error taxonomy for loading, solving and regeneration
// Every failure is returned as a value carrying a human-readable message

use thiserror::Error;

/// Errors surfaced by the transform pipeline
#[derive(Debug, Error)]
pub enum TransformError {
    /// A required fixed input is non-positive or otherwise out of domain
    #[error("Invalid {field}: {message}")]
    InvalidParameter {
        field: &'static str,
        message: String,
    },

    /// Missing file or unreadable stream
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Stream parsed but is structurally unusable (no tracks, bad header, ...)
    #[error("Malformed source: {0}")]
    MalformedSource(String),

    #[error("No source MIDI loaded")]
    NoSourceLoaded,

    #[error("Model is empty (no time segments)")]
    EmptySegmentation,

    #[error("Nothing to save: no sequence has been generated")]
    NothingGenerated,

    /// Generated output the file format cannot represent
    #[error("Cannot encode output: {0}")]
    Unencodable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransformError {
    /// Shorthand for an `InvalidParameter` naming the offending field
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        TransformError::InvalidParameter {
            field,
            message: message.into(),
        }
    }
}

pub type TransformResult<T> = Result<T, TransformError>;

//! Error types for the checksum, search and deduplication core.

use thiserror::Error;

/// Boxed error reported by an external collaborator (e.g. a verifier doing I/O).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid parameters (zero block size, missing mandatory window)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The verifier failed for a reason other than "not a match"
    #[error("Verifier failed on window {start}..{end} (checksum {checksum:#018x}): {source}")]
    Collaborator {
        start: usize,
        end: usize,
        checksum: u64,
        #[source]
        source: BoxError,
    },

    /// Segment stream or index content is inconsistent
    #[error("Format error: {message}")]
    Format { message: String },

    /// I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// True for errors caused by the caller's parameters rather than by data or collaborators.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

//! Error types shared across Framecut crates.

use std::path::PathBuf;

/// Top-level error type for Framecut operations.
#[derive(Debug, thiserror::Error)]
pub enum FramecutError {
    /// A source file is missing, cannot be parsed, has no track of the
    /// requested kind, or uses a codec no decoder is registered for.
    #[error("Source unreadable ({path}): {message}")]
    SourceUnreadable { path: PathBuf, message: String },

    /// The hardware codec instance limit was exceeded.
    #[error("Codec instances exhausted: {message}")]
    DecoderExhausted { message: String },

    /// The target container rejected a track format.
    #[error("Track incompatible with container: {message}")]
    MuxIncompatible { message: String },

    /// The operation was cancelled. This is a terminal state, not a failure.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Codec error: {message}")]
    Codec { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Timeline error: {message}")]
    Timeline { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using FramecutError.
pub type FramecutResult<T> = Result<T, FramecutError>;

impl FramecutError {
    pub fn source_unreadable(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::SourceUnreadable {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn decoder_exhausted(msg: impl Into<String>) -> Self {
        Self::DecoderExhausted {
            message: msg.into(),
        }
    }

    pub fn mux_incompatible(msg: impl Into<String>) -> Self {
        Self::MuxIncompatible {
            message: msg.into(),
        }
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn timeline(msg: impl Into<String>) -> Self {
        Self::Timeline {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error is the cancellation terminal state.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_distinguishable() {
        assert!(FramecutError::Cancelled.is_cancelled());
        assert!(!FramecutError::render("boom").is_cancelled());
    }

    #[test]
    fn test_source_unreadable_message_names_path() {
        let err = FramecutError::source_unreadable("/tmp/missing.fcm", "no audio track");
        let text = err.to_string();
        assert!(text.contains("/tmp/missing.fcm"));
        assert!(text.contains("no audio track"));
    }
}

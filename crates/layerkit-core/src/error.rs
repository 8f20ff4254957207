//! Error types for layer import.
//!
//! Every failure raised while turning a source artifact into layers is one of
//! these variants. Only template catalog misses are swallowed; everything else
//! aborts the import.

use std::path::PathBuf;
use thiserror::Error;

use crate::cancel::CancelledError;

/// Main error type for the layerkit library.
#[derive(Debug, Error)]
pub enum LayerError {
    // Resolution errors
    #[error("Manifest not found: {name}")]
    ManifestNotFound { name: String },

    #[error("Remote pull failed for {name}: {message}")]
    Pull { name: String, message: String },

    // Input classification errors
    #[error("Unsupported content type: {content_type}")]
    UnsupportedContentType { content_type: String },

    // Archive errors
    #[error("Insecure path in archive: {entry}")]
    InsecurePath { entry: String },

    #[error("Archive error: {message}")]
    Archive {
        message: String,
        #[source]
        source: Option<zip::result::ZipError>,
    },

    // Decoding errors
    #[error("Malformed model document at offset {offset}: {message}")]
    Format { offset: u64, message: String },

    // Integrity errors
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Digest collision: {digest} already stored with different content")]
    DigestCollision { digest: String },

    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    // Storage errors
    #[error("Blob not found: {digest}")]
    BlobNotFound { digest: String },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Conversion errors
    #[error("Model conversion failed: {message}")]
    Conversion { message: String },

    #[error("Import cancelled")]
    Cancelled,

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for layerkit operations.
pub type Result<T> = std::result::Result<T, LayerError>;

impl From<std::io::Error> for LayerError {
    fn from(err: std::io::Error) -> Self {
        // Cancel-aware readers smuggle the cancellation marker through io::Error.
        if err
            .get_ref()
            .is_some_and(|inner| inner.is::<CancelledError>())
        {
            return LayerError::Cancelled;
        }
        LayerError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for LayerError {
    fn from(err: serde_json::Error) -> Self {
        LayerError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<zip::result::ZipError> for LayerError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => io.into(),
            other => LayerError::Archive {
                message: other.to_string(),
                source: Some(other),
            },
        }
    }
}

impl From<tokio::task::JoinError> for LayerError {
    fn from(err: tokio::task::JoinError) -> Self {
        LayerError::Other(format!("Import task failed: {}", err))
    }
}

impl LayerError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        match LayerError::from(err) {
            LayerError::Io {
                message, source, ..
            } => LayerError::Io {
                message,
                path: Some(path.into()),
                source,
            },
            other => other,
        }
    }

    /// Create a format error at the given byte offset.
    pub fn format(offset: u64, message: impl Into<String>) -> Self {
        LayerError::Format {
            offset,
            message: message.into(),
        }
    }

    /// Check if this error should trigger a retry by the caller.
    ///
    /// Only remote pulls are candidates; integrity, security and format
    /// failures are final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LayerError::Pull { .. })
    }

    /// Whether this error is the recoverable "manifest absent" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LayerError::ManifestNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LayerError::UnsupportedContentType {
            content_type: "unknown".into(),
        };
        assert_eq!(err.to_string(), "Unsupported content type: unknown");
    }

    #[test]
    fn test_format_error_includes_offset() {
        let err = LayerError::format(4096, "bad magic");
        assert!(err.to_string().contains("4096"));
    }

    #[test]
    fn test_cancelled_io_error_maps_to_cancelled() {
        let io = std::io::Error::other(CancelledError);
        assert!(matches!(LayerError::from(io), LayerError::Cancelled));
    }

    #[test]
    fn test_io_with_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        match LayerError::io_with_path(io, "/tmp/blob") {
            LayerError::Io { path, .. } => assert_eq!(path, Some(PathBuf::from("/tmp/blob"))),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_retryable_errors() {
        assert!(LayerError::Pull {
            name: "m".into(),
            message: "503".into()
        }
        .is_retryable());
        assert!(!LayerError::InsecurePath {
            entry: "../evil".into()
        }
        .is_retryable());
        assert!(!LayerError::DigestCollision {
            digest: "sha256:00".into()
        }
        .is_retryable());
    }
}

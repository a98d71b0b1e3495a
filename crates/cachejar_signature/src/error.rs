//! Error types for signature computation.

use std::path::PathBuf;

/// Errors that can occur while fingerprinting a source.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// The local file or directory does not exist.
    #[error("source not found: {path}")]
    SourceNotFound {
        /// The path that was requested.
        path: PathBuf,
    },

    /// An I/O error occurred while reading filesystem metadata.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A remote resource could not be fetched or answered with an error status.
    #[error("failed to fetch {url}: {reason}")]
    RemoteFetch {
        /// The requested URL.
        url: String,
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Description of the failure.
        reason: String,
    },
}

impl SignatureError {
    /// Maps an I/O error on `path`, turning `NotFound` into [`SignatureError::SourceNotFound`].
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::SourceNotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    /// Returns `true` if the source no longer exists.
    ///
    /// Covers a missing local path and a remote resource answering
    /// `404 Not Found` or `410 Gone`. Transport failures and other statuses
    /// say nothing about whether the resource still exists.
    pub fn is_unresolvable(&self) -> bool {
        match self {
            Self::SourceNotFound { .. } => true,
            Self::RemoteFetch {
                status: Some(status),
                ..
            } => *status == 404 || *status == 410,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_source_not_found() {
        let err = SignatureError::from_io(
            "/tmp/missing",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, SignatureError::SourceNotFound { .. }));
        assert!(err.is_unresolvable());
    }

    #[test]
    fn other_io_errors_are_kept() {
        let err = SignatureError::from_io(
            "/tmp/locked",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, SignatureError::Io { .. }));
        assert!(!err.is_unresolvable());
    }

    #[test]
    fn remote_status_resolution() {
        let gone = SignatureError::RemoteFetch {
            url: "http://example.org/x".to_string(),
            status: Some(404),
            reason: "404 Not Found".to_string(),
        };
        let unreachable = SignatureError::RemoteFetch {
            url: "http://example.invalid/".to_string(),
            status: None,
            reason: "dns error".to_string(),
        };
        assert!(gone.is_unresolvable());
        assert!(!unreachable.is_unresolvable());
        assert!(gone.to_string().contains("http://example.org/x"));
    }
}

//! Error types for cache operations.

use std::path::PathBuf;

use cachejar_config::ConfigError;
use cachejar_signature::SignatureError;

/// Errors that can occur during cache operations.
///
/// Integrity problems (an unreadable index, foreign files in a cache
/// directory, an artifact that no longer decodes) are always reported and
/// never repaired automatically.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The source could not be fingerprinted.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// The index file is unreadable or inconsistent with the directory.
    #[error("corrupt cache index at {path}: {reason}")]
    CorruptIndex {
        /// The index file path.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// A destructive operation found files the index does not know about.
    #[error("cache directory {dir} contains files not created by the cache: {}", files.join(", "))]
    ForeignFiles {
        /// The cache directory that was being cleared.
        dir: PathBuf,
        /// Names of the unknown files.
        files: Vec<String>,
    },

    /// An index-referenced artifact could not be decoded.
    #[error("cannot deserialize artifact {path}: {reason}")]
    Deserialization {
        /// The artifact file path.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// An object or key could not be serialized.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// The application id cannot be used as a directory name.
    #[error("invalid application id {appid:?}: {reason}")]
    InvalidAppId {
        /// The rejected id.
        appid: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The jar was removed by `clear(true)`; the handle is no longer usable.
    #[error("cache jar {appid:?} was removed; obtain a new one from its factory")]
    Removed {
        /// Application id of the removed jar.
        appid: String,
    },

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if the error reports a missing local source.
    pub fn is_source_not_found(&self) -> bool {
        matches!(
            self,
            Self::Signature(SignatureError::SourceNotFound { .. })
        )
    }
}

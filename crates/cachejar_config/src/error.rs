//! Configuration errors.

use std::path::{Path, PathBuf};

/// Errors raised while reading `cachejar.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists in configuration but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// The configuration file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The text is not valid TOML or does not match the expected layout.
    #[error("malformed configuration in {}: {reason}", origin(path.as_deref()))]
    Parse {
        /// The file the text came from; `None` for in-memory text.
        path: Option<PathBuf>,
        /// The parser's message.
        reason: String,
    },

    /// A setting parsed but is unusable.
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        /// Dotted name of the setting, e.g. `remote.timeout_secs`.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

fn origin(path: Option<&Path>) -> String {
    match path {
        Some(path) => path.display().to_string(),
        None => "<string>".to_string(),
    }
}

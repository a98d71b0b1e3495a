//! Configuration types deserialized from `cachejar.toml`.

use serde::Deserialize;
use std::path::PathBuf;

/// Directory name used under the platform cache directory for the default root.
pub const DEFAULT_ROOT_NAME: &str = "cachejar";

/// The top-level configuration parsed from `cachejar.toml`.
///
/// Every section is optional; an empty file yields [`CacheConfig::default`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// Cache root and factory-wide flags.
    #[serde(default)]
    pub cache: CacheSection,
    /// Settings used when fingerprinting remote URLs.
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// The `[cache]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheSection {
    /// Explicit cache root. When absent the platform cache directory is used.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Default value of the per-jar `disabled` flag.
    #[serde(default)]
    pub disabled: bool,
}

/// The `[remote]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// `User-Agent` header sent with signature requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Whole-request timeout in seconds. Absent means no client-side timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_user_agent() -> String {
    concat!("cachejar/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: None,
        }
    }
}

impl CacheConfig {
    /// Returns the configured root, or the per-user default location.
    pub fn resolved_root(&self) -> PathBuf {
        self.cache.root.clone().unwrap_or_else(default_root)
    }
}

/// Returns the conventional per-user cache root.
///
/// Uses the platform-specific cache directory (e.g. `~/.cache/cachejar` on
/// Linux, `~/Library/Caches/cachejar` on macOS). Falls back to
/// `.cache/cachejar` in the current directory if the platform cache
/// directory cannot be determined.
pub fn default_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join(DEFAULT_ROOT_NAME)
}

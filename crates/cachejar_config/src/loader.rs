//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::CacheConfig;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "CACHEJAR_CONFIG";

/// File name looked up under the platform configuration directory.
const CONFIG_FILE: &str = "cachejar.toml";

/// Loads and validates a configuration file.
pub fn load_config(path: &Path) -> Result<CacheConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content, Some(path))
}

/// Parses and validates configuration text that did not come from a file.
pub fn load_config_from_str(content: &str) -> Result<CacheConfig, ConfigError> {
    parse(content, None)
}

fn parse(content: &str, path: Option<&Path>) -> Result<CacheConfig, ConfigError> {
    let config: CacheConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        path: path.map(Path::to_path_buf),
        reason: e.message().to_string(),
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Locates and loads the configuration for the process-wide default factory.
///
/// Uses `$CACHEJAR_CONFIG` when set; otherwise
/// `<platform config dir>/cachejar/cachejar.toml` if it exists; otherwise
/// the built-in defaults.
pub fn discover_config() -> Result<CacheConfig, ConfigError> {
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
        return load_config(Path::new(&path));
    }
    match user_config_path() {
        Some(path) if path.is_file() => load_config(&path),
        _ => Ok(CacheConfig::default()),
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(crate::types::DEFAULT_ROOT_NAME).join(CONFIG_FILE))
}

fn validate_config(config: &CacheConfig) -> Result<(), ConfigError> {
    let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });
    if config.cache.root.as_ref().is_some_and(|r| r.as_os_str().is_empty()) {
        return invalid("cache.root", "must not be empty");
    }
    if config.remote.user_agent.trim().is_empty() {
        return invalid("remote.user_agent", "must not be blank");
    }
    if config.remote.timeout_secs == Some(0) {
        return invalid("remote.timeout_secs", "must be at least 1");
    }
    Ok(())
}

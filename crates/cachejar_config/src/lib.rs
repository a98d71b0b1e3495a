//! Parsing and validation of `cachejar.toml` configuration files.
//!
//! This crate reads the optional configuration file and produces a
//! strongly-typed [`CacheConfig`] describing the cache root, the factory-wide
//! default-disabled flag, and the settings used when fingerprinting URLs.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{discover_config, load_config, load_config_from_str, CONFIG_ENV_VAR};
pub use types::*;

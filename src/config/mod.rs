//! Configuration merge system
//!
//! Implements the 3-layer configuration merge:
//! 1. Built-in defaults
//! 2. Config file (TOML)
//! 3. CLI overrides
//!
//! The merged value deserializes into [`CacheConfig`].

mod defaults;
mod effective;
mod merge;

use std::path::{Path, PathBuf};

use graphcache_store::StoreConfig;
use serde::{Deserialize, Serialize};

pub use defaults::BuiltinDefaults;
pub use effective::{ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{merge_layers, Layered};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// What happens to requests for a signature whose last compile failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Return the recorded failure without calling the backend again
    #[default]
    Sticky,
    /// Compile again on the next request
    Retry,
}

/// Background compilation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AsyncConfig {
    /// Worker threads
    pub workers: usize,
    /// Queued compilations beyond those already running
    pub max_pending: usize,
}

impl Default for AsyncConfig {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            workers: defaults.async_workers,
            max_pending: defaults.async_max_pending,
        }
    }
}

/// Compilation cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Directory for persisted artifacts; empty disables persistence
    pub persistent_cache_directory: String,

    /// Accept persisted records whose signature fingerprint differs
    pub disable_strict_signature_checks: bool,

    /// Prefix for persisted record file names
    pub persistence_prefix: String,

    /// Requests for a signature before a lazy compile happens
    pub lazy_compile_threshold: u64,

    #[serde(rename = "async")]
    pub async_compile: AsyncConfig,

    pub failure_policy: FailurePolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            persistent_cache_directory: defaults.persistent_cache_directory,
            disable_strict_signature_checks: defaults.disable_strict_signature_checks,
            persistence_prefix: defaults.persistence_prefix,
            lazy_compile_threshold: defaults.lazy_compile_threshold,
            async_compile: AsyncConfig::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Load from an optional TOML file plus CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_overrides: Option<serde_json::Value>,
    ) -> Result<Self, ConfigError> {
        EffectiveConfig::build(config_path, cli_overrides)?.resolve()
    }

    /// Parse TOML text layered over the defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        EffectiveConfig::from_toml_str(contents)?.resolve()
    }

    /// Use `dir` for persisted artifacts.
    pub fn with_persistence(mut self, dir: impl AsRef<Path>) -> Self {
        self.persistent_cache_directory = dir.as_ref().to_string_lossy().to_string();
        self
    }

    /// Persistence directory, or `None` when persistence is disabled.
    pub fn persistence_directory(&self) -> Option<PathBuf> {
        if self.persistent_cache_directory.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.persistent_cache_directory))
        }
    }

    /// Store settings derived from this config.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            directory: self.persistence_directory(),
            prefix: self.persistence_prefix.clone(),
            strict_signature_checks: !self.disable_strict_signature_checks,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lazy_compile_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "lazy_compile_threshold must be >= 1".to_string(),
            ));
        }
        if self.async_compile.workers == 0 {
            return Err(ConfigError::ValidationError(
                "async.workers must be >= 1".to_string(),
            ));
        }
        if self.async_compile.max_pending == 0 {
            return Err(ConfigError::ValidationError(
                "async.max_pending must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

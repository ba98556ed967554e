//! Built-in defaults (layer 1)
//!
//! Hardcoded defaults for all configuration values.

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Persistent cache directory (default: "" = persistence disabled)
    pub persistent_cache_directory: String,

    /// Skip signature fingerprint comparison on load (default: false)
    pub disable_strict_signature_checks: bool,

    /// Record file name prefix (default: "")
    pub persistence_prefix: String,

    /// Requests before a lazy compile (default: 2)
    pub lazy_compile_threshold: u64,

    /// Async worker threads (default: 2)
    pub async_workers: usize,

    /// Queued async compilations (default: 10)
    pub async_max_pending: usize,

    /// Failure policy (default: "sticky")
    pub failure_policy: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            persistent_cache_directory: String::new(),
            disable_strict_signature_checks: false,
            persistence_prefix: String::new(),
            lazy_compile_threshold: 2,
            async_workers: 2,
            async_max_pending: 10,
            failure_policy: "sticky".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "persistent_cache_directory": self.persistent_cache_directory,
            "disable_strict_signature_checks": self.disable_strict_signature_checks,
            "persistence_prefix": self.persistence_prefix,
            "lazy_compile_threshold": self.lazy_compile_threshold,
            "async": {
                "workers": self.async_workers,
                "max_pending": self.async_max_pending
            },
            "failure_policy": self.failure_policy
        })
    }
}

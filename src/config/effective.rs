//! Resolved cache configuration and where it came from.
//!
//! Up to three layers contribute: the builtin defaults, one TOML file and
//! `--set` overrides from the command line. The merged table is kept as
//! JSON so `graphcache config` can print it before it is deserialized.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;
use super::{CacheConfig, ConfigError};

/// Which layer a value came from, lowest precedence first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// One layer that took part in the merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// Config file location, for file layers read from disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the TOML text, for file layers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ConfigSource {
    fn new(origin: ConfigOrigin) -> Self {
        Self {
            origin,
            path: None,
            digest: None,
        }
    }
}

/// Cache settings after layering, not yet validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub config: Value,

    pub sources: Vec<ConfigSource>,

    /// Layer that set each key, by dotted path
    pub origins: BTreeMap<String, ConfigOrigin>,
}

impl EffectiveConfig {
    /// Layer `config_path` and `cli_overrides` over the builtin defaults.
    ///
    /// A named config file must exist; there is no search path to fall
    /// back on.
    pub fn build(
        config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![builtin_layer()];

        if let Some(path) = config_path {
            let text = fs::read_to_string(path)
                .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
            let mut source = file_source(&text);
            source.path = Some(path.display().to_string());
            layers.push((source, parse_toml(&text)?));
        }

        if let Some(overrides) = cli_overrides {
            layers.push((ConfigSource::new(ConfigOrigin::Cli), overrides));
        }

        Self::merge(layers)
    }

    /// Layer TOML text over the builtin defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file = (file_source(contents), parse_toml(contents)?);
        Self::merge(vec![builtin_layer(), file])
    }

    fn merge(layers: Vec<(ConfigSource, Value)>) -> Result<Self, ConfigError> {
        let (sources, values): (Vec<_>, Vec<_>) = layers
            .into_iter()
            .map(|(source, value)| (source.clone(), (source.origin, value)))
            .unzip();
        let merged = merge_layers(values)?;

        Ok(Self {
            config: merged.value,
            sources,
            origins: merged.origins,
        })
    }

    /// Deserialize the merged table and check its values.
    pub fn resolve(&self) -> Result<CacheConfig, ConfigError> {
        let config = CacheConfig::deserialize(&self.config)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty JSON of the merged table, its sources and per-key origins.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Layer that set the value at `key` (e.g. `async.workers`).
    pub fn origin_of(&self, key: &str) -> Option<ConfigOrigin> {
        self.origins.get(key).copied()
    }

    /// Merged value at `key` (e.g. `async.workers`).
    pub fn get(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .try_fold(&self.config, |table, field| table.get(field))
    }
}

fn builtin_layer() -> (ConfigSource, Value) {
    (
        ConfigSource::new(ConfigOrigin::Builtin),
        BuiltinDefaults::default().to_value(),
    )
}

fn file_source(text: &str) -> ConfigSource {
    ConfigSource {
        digest: Some(hex::encode(Sha256::digest(text.as_bytes()))),
        ..ConfigSource::new(ConfigOrigin::File)
    }
}

fn parse_toml(text: &str) -> Result<Value, ConfigError> {
    let table: toml::Table =
        toml::from_str(text).map_err(|e| ConfigError::ParseError(format!("invalid TOML: {}", e)))?;
    serde_json::to_value(table).map_err(|e| ConfigError::ParseError(e.to_string()))
}

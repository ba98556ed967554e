//! Layering of cache configuration.
//!
//! Every layer is a partial cache config table. A later layer overrides an
//! earlier one key by key, and nested tables such as `[async]` merge field
//! by field, so a file can set `async.workers` and keep the default
//! `max_pending`. Each leaf remembers the layer that last set it.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::effective::ConfigOrigin;
use super::ConfigError;

/// Result of merging config layers.
#[derive(Debug, Clone, PartialEq)]
pub struct Layered {
    /// Merged config table
    pub value: Value,
    /// Dotted key path to the layer that set it
    pub origins: BTreeMap<String, ConfigOrigin>,
}

/// Merge layers in precedence order (first is the base, last wins).
///
/// Every layer must be a table; anything else is rejected before merging.
pub fn merge_layers(layers: Vec<(ConfigOrigin, Value)>) -> Result<Layered, ConfigError> {
    let mut merged = Map::new();
    let mut origins = BTreeMap::new();

    for (origin, layer) in layers {
        let Value::Object(table) = layer else {
            return Err(ConfigError::ValidationError(format!(
                "{:?} config layer is not a table",
                origin
            )));
        };
        merge_table(&mut merged, table, "", origin, &mut origins);
    }

    Ok(Layered {
        value: Value::Object(merged),
        origins,
    })
}

fn merge_table(
    base: &mut Map<String, Value>,
    overlay: Map<String, Value>,
    prefix: &str,
    origin: ConfigOrigin,
    origins: &mut BTreeMap<String, ConfigOrigin>,
) {
    for (key, value) in overlay {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        let nested = value.is_object() && matches!(base.get(&key), Some(Value::Object(_)));
        if nested {
            if let (Some(Value::Object(existing)), Value::Object(table)) =
                (base.get_mut(&key), value)
            {
                merge_table(existing, table, &path, origin, origins);
            }
            continue;
        }

        // The replaced value's leaves no longer exist.
        let children = format!("{}.", path);
        origins.retain(|k, _| k != &path && !k.starts_with(&children));
        record_leaves(&value, &path, origin, origins);
        base.insert(key, value);
    }
}

fn record_leaves(
    value: &Value,
    path: &str,
    origin: ConfigOrigin,
    origins: &mut BTreeMap<String, ConfigOrigin>,
) {
    match value {
        Value::Object(table) if !table.is_empty() => {
            for (key, child) in table {
                record_leaves(child, &format!("{}.{}", path, key), origin, origins);
            }
        }
        _ => {
            origins.insert(path.to_string(), origin);
        }
    }
}

//! Command-line argument specs.
//!
//! Argument grammar used by the `graphcache` binary:
//!
//! - `f32[2,3]` - parameter with the given type and shape (`?` = unknown dim)
//! - `f32` - scalar parameter
//! - `resource:f32[4]` - resource variable
//! - `const:i32=5` - scalar constant
//! - `const:f32[2]=1.5,2.5` - tensor constant

use std::str::FromStr;

use graphcache_signature::{Argument, DataType, IdentityError, Literal};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors parsing command-line specs.
#[derive(Debug, Error, PartialEq)]
pub enum SpecError {
    #[error("unknown data type '{0}'")]
    UnknownType(String),

    #[error("malformed shape in '{0}'")]
    MalformedShape(String),

    #[error("constant '{0}' needs a value after '='")]
    MissingValue(String),

    #[error("cannot parse '{value}' as {dtype}")]
    BadValue { value: String, dtype: DataType },

    #[error("{dtype} constants cannot be written on the command line")]
    UnsupportedConstantType { dtype: DataType },

    #[error("expected key=value, got '{0}'")]
    MissingEquals(String),

    #[error(transparent)]
    Literal(#[from] IdentityError),
}

/// Parse one argument spec.
pub fn parse_argument(spec: &str) -> Result<Argument, SpecError> {
    if let Some(rest) = spec.strip_prefix("const:") {
        let (ty, values) = rest
            .split_once('=')
            .ok_or_else(|| SpecError::MissingValue(spec.to_string()))?;
        let (dtype, dims) = parse_type(ty)?;
        let literal = parse_literal(dtype, dims, values)?;
        return Ok(Argument::constant(literal));
    }

    if let Some(rest) = spec.strip_prefix("resource:") {
        let (dtype, dims) = parse_type(rest)?;
        return Ok(Argument::resource(dtype, dims));
    }

    let (dtype, dims) = parse_type(spec)?;
    Ok(Argument::parameter(dtype, dims))
}

/// Parse `dtype` or `dtype[d0,d1,...]`.
fn parse_type(spec: &str) -> Result<(DataType, Vec<i64>), SpecError> {
    let (name, dims) = match spec.split_once('[') {
        Some((name, rest)) => {
            let inner = rest
                .strip_suffix(']')
                .ok_or_else(|| SpecError::MalformedShape(spec.to_string()))?;
            (name, parse_dims(inner).ok_or_else(|| SpecError::MalformedShape(spec.to_string()))?)
        }
        None => (spec, Vec::new()),
    };

    let dtype = DataType::from_str(name.trim()).ok_or_else(|| SpecError::UnknownType(name.to_string()))?;
    Ok((dtype, dims))
}

fn parse_dims(inner: &str) -> Option<Vec<i64>> {
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    inner
        .split(',')
        .map(|d| match d.trim() {
            "?" => Some(-1),
            d => d.parse().ok(),
        })
        .collect()
}

fn parse_literal(dtype: DataType, dims: Vec<i64>, values: &str) -> Result<Literal, SpecError> {
    let mut data = Vec::new();
    for value in values.split(',').map(str::trim) {
        encode_value(dtype, value, &mut data)?;
    }
    Ok(Literal::new(dtype, dims, data)?)
}

fn encode_value(dtype: DataType, value: &str, out: &mut Vec<u8>) -> Result<(), SpecError> {
    fn parse<T: FromStr>(dtype: DataType, value: &str) -> Result<T, SpecError> {
        value.parse().map_err(|_| SpecError::BadValue {
            value: value.to_string(),
            dtype,
        })
    }

    match dtype {
        DataType::Bool => out.push(parse::<bool>(dtype, value)? as u8),
        DataType::I8 => out.extend(parse::<i8>(dtype, value)?.to_le_bytes()),
        DataType::I16 => out.extend(parse::<i16>(dtype, value)?.to_le_bytes()),
        DataType::I32 => out.extend(parse::<i32>(dtype, value)?.to_le_bytes()),
        DataType::I64 => out.extend(parse::<i64>(dtype, value)?.to_le_bytes()),
        DataType::U8 => out.extend(parse::<u8>(dtype, value)?.to_le_bytes()),
        DataType::U16 => out.extend(parse::<u16>(dtype, value)?.to_le_bytes()),
        DataType::U32 => out.extend(parse::<u32>(dtype, value)?.to_le_bytes()),
        DataType::U64 => out.extend(parse::<u64>(dtype, value)?.to_le_bytes()),
        DataType::F32 => out.extend(parse::<f32>(dtype, value)?.to_le_bytes()),
        DataType::F64 => out.extend(parse::<f64>(dtype, value)?.to_le_bytes()),
        DataType::F16 | DataType::Bf16 => {
            return Err(SpecError::UnsupportedConstantType { dtype })
        }
    }
    Ok(())
}

/// Split `key=value`.
pub fn parse_key_value(spec: &str) -> Result<(String, String), SpecError> {
    spec.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| SpecError::MissingEquals(spec.to_string()))
}

/// Turn `--set` overrides into a config layer.
///
/// Keys are dot-separated paths (`async.workers`). Values are parsed as
/// JSON when possible (`4`, `true`) and kept as strings otherwise.
pub fn overrides_to_value(overrides: &[String]) -> Result<Option<Value>, SpecError> {
    if overrides.is_empty() {
        return Ok(None);
    }

    let mut root = Map::new();
    for spec in overrides {
        let (key, raw) = parse_key_value(spec)?;
        let value = match serde_json::from_str::<Value>(&raw) {
            Ok(value) => value,
            Err(_) => Value::String(raw),
        };

        let path: Vec<&str> = key.split('.').collect();
        insert_path(&mut root, &path, value);
    }
    Ok(Some(Value::Object(root)))
}

fn insert_path(table: &mut Map<String, Value>, path: &[&str], value: Value) {
    match path {
        [] => {}
        [leaf] => {
            table.insert(leaf.to_string(), value);
        }
        [head, rest @ ..] => {
            let slot = table
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(next) = slot {
                insert_path(next, rest, value);
            }
        }
    }
}

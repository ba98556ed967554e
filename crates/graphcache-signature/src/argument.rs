//! Caller-supplied descriptions of a compiled unit and its arguments.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::dtype::DataType;
use crate::literal::Literal;

/// Name of a compiled unit plus the attributes that parameterize it.
///
/// Attributes are kept sorted so the canonical form does not depend on
/// insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UnitName {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
}

impl UnitName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: BTreeMap::new(),
        }
    }

    /// Add an attribute.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Canonical form: `name` or `name[k1=v1,k2=v2]`.
    pub fn canonical(&self) -> String {
        if self.attrs.is_empty() {
            return self.name.clone();
        }
        let attrs: Vec<String> = self
            .attrs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{}[{}]", self.name, attrs.join(","))
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// How an argument reaches the compiled unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentKind {
    /// Unset or unrecognized.
    Invalid,
    /// Compile-time constant folded into the computation.
    Constant,
    /// Runtime tensor; only type and shape matter.
    Parameter,
    /// Mutable resource variable, described by type and shape.
    Resource,
    /// Resource whose current value is treated as a constant.
    ConstantResource,
    /// Ordering token with no data.
    Token,
    /// Dynamically sized list of tensors.
    TensorList,
}

/// One argument as supplied by the caller.
///
/// This is the loose, externally-facing form. [`crate::build_signature`]
/// classifies it into a strongly-typed [`crate::ArgSignature`] or rejects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub kind: ArgumentKind,
    pub dtype: DataType,
    /// Dimensions; `-1` marks an unknown size.
    pub dims: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant_value: Option<Literal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Argument {
    /// Runtime tensor argument.
    pub fn parameter(dtype: DataType, dims: Vec<i64>) -> Self {
        Self {
            kind: ArgumentKind::Parameter,
            dtype,
            dims,
            constant_value: None,
            name: None,
        }
    }

    /// Compile-time constant argument.
    pub fn constant(value: Literal) -> Self {
        Self {
            kind: ArgumentKind::Constant,
            dtype: value.dtype(),
            dims: value.dims().to_vec(),
            constant_value: Some(value),
            name: None,
        }
    }

    /// Resource variable argument.
    pub fn resource(dtype: DataType, dims: Vec<i64>) -> Self {
        Self {
            kind: ArgumentKind::Resource,
            ..Self::parameter(dtype, dims)
        }
    }

    /// Resource argument whose value is known at compile time.
    pub fn constant_resource(value: Literal) -> Self {
        Self {
            kind: ArgumentKind::ConstantResource,
            ..Self::constant(value)
        }
    }

    /// Ordering token.
    pub fn token() -> Self {
        Self {
            kind: ArgumentKind::Token,
            dtype: DataType::Bool,
            dims: Vec::new(),
            constant_value: None,
            name: None,
        }
    }

    /// Attach a debugging name. Names never affect the signature.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_name_canonical_sorts_attrs() {
        let a = UnitName::new("cluster_0")
            .with_attr("b", "2")
            .with_attr("a", "1");
        assert_eq!(a.canonical(), "cluster_0[a=1,b=2]");
        assert_eq!(UnitName::new("plain").canonical(), "plain");
    }

    #[test]
    fn test_constant_argument_mirrors_literal() {
        let arg = Argument::constant(Literal::from_i32s(vec![2], &[1, 2]).unwrap());
        assert_eq!(arg.kind, ArgumentKind::Constant);
        assert_eq!(arg.dtype, DataType::I32);
        assert_eq!(arg.dims, vec![2]);
    }

    #[test]
    fn test_resource_constructors() {
        let res = Argument::resource(DataType::F32, vec![4]);
        assert_eq!(res.kind, ArgumentKind::Resource);
        assert!(res.constant_value.is_none());

        let cres = Argument::constant_resource(Literal::scalar_f32(1.0));
        assert_eq!(cres.kind, ArgumentKind::ConstantResource);
        assert!(cres.constant_value.is_some());
    }

    #[test]
    fn test_argument_serialization() {
        let arg = Argument::parameter(DataType::F32, vec![2, -1]).named("x");
        let json = serde_json::to_string(&arg).unwrap();
        let parsed: Argument = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, arg);
    }

    #[test]
    fn test_argument_with_malformed_constant_rejected() {
        let json = r#"{
            "kind": "constant",
            "dtype": "i32",
            "dims": [4],
            "constant_value": {"dtype": "i32", "dims": [4], "data": "01000000"}
        }"#;
        let err = serde_json::from_str::<Argument>(json).unwrap_err();
        assert!(err.to_string().contains("malformed literal"), "{}", err);

        let well_formed = json.replace("01000000", "01000000020000000300000004000000");
        let arg: Argument = serde_json::from_str(&well_formed).unwrap();
        assert_eq!(arg.constant_value.unwrap().element_count(), 4);
    }
}

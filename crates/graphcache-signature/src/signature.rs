//! Signature building and identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::argument::{Argument, ArgumentKind, UnitName};
use crate::dtype::DataType;
use crate::error::{IdentityError, IdentityResult};
use crate::literal::{format_dims, Literal};

/// Compile-relevant description of one argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArgSignature {
    /// Compile-time constant, identified by value.
    Constant { value: Literal },
    /// Runtime tensor, identified by element type and dimensions.
    TypeAndShape { dtype: DataType, dims: Vec<i64> },
}

impl fmt::Display for ArgSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant { value } => write!(f, "const {}", value),
            Self::TypeAndShape { dtype, dims } => write!(f, "{}{}", dtype, format_dims(dims)),
        }
    }
}

/// Cache key for one compilation.
///
/// Equality is structural over the unit name, its attributes and every
/// argument, in argument order. The derived `Hash` combines the same fields,
/// so equal signatures always hash equally. Attributes stay a map here; the
/// bracketed `name[k=v]` form is only for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    pub args: Vec<ArgSignature>,
}

impl Signature {
    /// Unit name with attributes, e.g. `matmul[T=f32]`.
    pub fn unit_label(&self) -> String {
        UnitName {
            name: self.name.clone(),
            attrs: self.attrs.clone(),
        }
        .canonical()
    }

    /// Human-readable description, e.g. `matmul: f32[2,3]; const i32[] 1`.
    pub fn human_string(&self) -> String {
        let label = self.unit_label();
        let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
        if args.is_empty() {
            label
        } else {
            format!("{}: {}", label, args.join("; "))
        }
    }

    /// Process-independent identity.
    ///
    /// SHA-256 hex digest of the RFC 8785 (JCS) canonical JSON form. Unlike
    /// the `Hash` impl this is stable across builds and platforms, so it is
    /// safe to write to disk.
    pub fn fingerprint(&self) -> IdentityResult<String> {
        let jcs_bytes = serde_json_canonicalizer::to_vec(self)
            .map_err(|e| IdentityError::Canonicalization(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(&jcs_bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.human_string())
    }
}

/// Build the signature for compiling `unit` with `args`.
///
/// Constant and constant-resource arguments are keyed by value; parameters
/// and resources by type and shape. Any other argument kind cannot be
/// cached and is rejected.
pub fn build_signature(unit: &UnitName, args: &[Argument]) -> IdentityResult<Signature> {
    if unit.name.is_empty() {
        return Err(IdentityError::EmptyName);
    }

    let args = args
        .iter()
        .enumerate()
        .map(|(index, arg)| classify(index, arg))
        .collect::<IdentityResult<Vec<_>>>()?;

    Ok(Signature {
        name: unit.name.clone(),
        attrs: unit.attrs.clone(),
        args,
    })
}

fn classify(index: usize, arg: &Argument) -> IdentityResult<ArgSignature> {
    match arg.kind {
        ArgumentKind::Constant | ArgumentKind::ConstantResource => {
            let value = arg
                .constant_value
                .clone()
                .ok_or(IdentityError::MissingConstantValue { index })?;
            Ok(ArgSignature::Constant { value })
        }
        ArgumentKind::Parameter | ArgumentKind::Resource => {
            if let Some(&dim) = arg.dims.iter().find(|d| **d < -1) {
                return Err(IdentityError::InvalidDimension { index, dim });
            }
            Ok(ArgSignature::TypeAndShape {
                dtype: arg.dtype,
                dims: arg.dims.clone(),
            })
        }
        kind @ (ArgumentKind::Invalid | ArgumentKind::Token | ArgumentKind::TensorList) => {
            Err(IdentityError::UnhandledArgument { index, kind })
        }
    }
}

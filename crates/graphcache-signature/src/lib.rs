//! Canonical identities for compiled subgraph invocations.
//!
//! A [`Signature`] names a unit of computation together with the
//! compile-relevant description of each of its arguments: the element type
//! and shape of runtime tensors, and the full value of compile-time
//! constants. Two invocations that produce equal signatures can share one
//! compiled executable.

mod argument;
mod dtype;
mod error;
mod literal;
mod signature;

pub use argument::{Argument, ArgumentKind, UnitName};
pub use dtype::DataType;
pub use error::{IdentityError, IdentityResult};
pub use literal::Literal;
pub use signature::{build_signature, ArgSignature, Signature};

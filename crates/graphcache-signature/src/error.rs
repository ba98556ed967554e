//! Errors raised while classifying arguments into a signature.

use thiserror::Error;

use crate::argument::ArgumentKind;

/// Result type for signature building.
pub type IdentityResult<T> = Result<T, IdentityError>;

/// An argument list that cannot be turned into a signature.
///
/// These errors are never cached: the caller gets them back immediately and
/// no cache entry is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("unit name is empty")]
    EmptyName,

    #[error("argument {index}: unhandled argument kind {kind:?}")]
    UnhandledArgument { index: usize, kind: ArgumentKind },

    #[error("argument {index}: constant argument has no value")]
    MissingConstantValue { index: usize },

    #[error("malformed literal: expected {expected} bytes of data, got {actual}")]
    MalformedLiteral { expected: usize, actual: usize },

    #[error("invalid literal dimension {dim}")]
    InvalidLiteralShape { dim: i64 },

    #[error("argument {index}: invalid dimension {dim}")]
    InvalidDimension { index: usize, dim: i64 },

    #[error("canonicalization error: {0}")]
    Canonicalization(String),
}

//! Cache error types.

use std::io;

use graphcache_signature::IdentityError;
use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::entry::CompileState;

/// Cache result type
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors returned by [`crate::CompilationCache`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// The arguments could not be turned into a signature. Never cached.
    #[error("invalid signature: {0}")]
    Identity(#[from] IdentityError),

    /// The backend failed, now or on an earlier request for this signature.
    #[error("compilation failed: {0}")]
    Compilation(BackendError),

    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: CompileState, to: CompileState },

    #[error("async compile pool: {0}")]
    Pool(#[source] io::Error),

    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
}

impl CacheError {
    /// The backend failure behind this error, if any.
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            CacheError::Compilation(e) => Some(e),
            _ => None,
        }
    }
}

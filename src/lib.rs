//! graphcache: a compilation cache for computational subgraphs.
//!
//! Structurally identical subgraphs (same unit name, attributes, argument
//! types and shapes, and constant values) share one compiled executable.
//! Compiled executables can also be persisted so later processes skip code
//! generation.

pub mod backend;
pub mod builder;
pub mod cache;
pub mod cli;
pub mod config;
pub mod entry;
pub mod error;
pub mod mock;
pub mod pool;
pub mod table;

pub use backend::{
    Backend, BackendError, CompilationResult, CompileScope, Executable, IrModule, LowerRequest,
};
pub use cache::{CompilationCache, CompileMode, CompileOutcome, MissReason, OpContext};
pub use config::{CacheConfig, ConfigError, FailurePolicy};
pub use entry::{ArtifactOrigin, CompileState, CompileStatus, CompiledArtifacts};
pub use error::{CacheError, CacheResult};

pub use graphcache_signature::{
    build_signature, ArgSignature, Argument, ArgumentKind, DataType, IdentityError, Literal,
    Signature, UnitName,
};
pub use graphcache_store::{PersistedRecord, PersistentCacheKey, PersistentStore, StoreConfig};

//! Code-generation backend seam.
//!
//! The cache never generates code itself. It asks a [`Backend`] to lower a
//! unit into intermediate representation, to turn that into a runnable
//! [`Executable`], and to serialize and reload ahead-of-time (AOT) forms for
//! persistence.

use std::fmt;
use std::sync::Arc;

use graphcache_signature::{Argument, Literal, UnitName};
use thiserror::Error;

/// Errors reported by a backend.
///
/// These are recorded against the cache entry, so they must be cloneable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("lowering failed: {0}")]
    Lowering(String),

    #[error("code generation failed: {0}")]
    Codegen(String),

    #[error("AOT serialization failed: {0}")]
    Serialization(String),

    #[error("executable load failed: {0}")]
    Load(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("compilation aborted: {0}")]
    Aborted(String),
}

/// What is being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileScope {
    /// A single operation.
    Op,
    /// A named multi-operation function.
    Function,
}

/// Input to [`Backend::lower`].
#[derive(Debug, Clone, Copy)]
pub struct LowerRequest<'a> {
    pub unit: &'a UnitName,
    pub args: &'a [Argument],
    pub scope: CompileScope,
}

/// Serialized intermediate representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrModule {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Output of lowering a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationResult {
    pub module: IrModule,
    /// Outputs that must be computed at run time (not folded to constants)
    pub computed_outputs: usize,
    /// Whether running the computation has side effects
    pub side_effecting: bool,
}

impl CompilationResult {
    /// Whether an executable must be built to run this computation.
    ///
    /// Fully constant-folded, side-effect-free computations need none.
    pub fn needs_executable(&self) -> bool {
        self.computed_outputs > 0 || self.side_effecting
    }
}

/// A runnable compiled artifact.
pub trait Executable: Send + Sync + fmt::Debug {
    /// Entry point name.
    fn name(&self) -> &str;

    /// Run with the given inputs.
    fn run(&self, inputs: &[Literal]) -> Result<Vec<Literal>, BackendError>;
}

/// External code generator.
pub trait Backend: Send + Sync {
    /// Device the backend targets (part of the persistent key).
    fn device_type(&self) -> &str;

    /// Lower a unit into IR.
    fn lower(&self, request: &LowerRequest<'_>) -> Result<CompilationResult, BackendError>;

    /// Generate a runnable executable.
    fn build_executable(
        &self,
        result: &CompilationResult,
    ) -> Result<Arc<dyn Executable>, BackendError>;

    /// Generate a serializable AOT form.
    fn build_aot(&self, result: &CompilationResult) -> Result<Vec<u8>, BackendError>;

    /// Load an executable from an AOT form produced by [`Backend::build_aot`].
    fn load_executable(
        &self,
        result: &CompilationResult,
        aot: &[u8],
    ) -> Result<Arc<dyn Executable>, BackendError>;
}

//! Executable builder.
//!
//! Glue between compiled IR and the backend's code generator.

use std::sync::Arc;

use tracing::debug;

use crate::backend::{Backend, BackendError, CompilationResult, Executable};

/// Builds, serializes and reloads executables through a backend.
#[derive(Clone)]
pub struct ExecutableBuilder {
    backend: Arc<dyn Backend>,
}

impl ExecutableBuilder {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Build a runnable executable.
    ///
    /// Returns `Ok(None)` when the computation needs no executable.
    pub fn build(
        &self,
        result: &CompilationResult,
    ) -> Result<Option<Arc<dyn Executable>>, BackendError> {
        if !result.needs_executable() {
            debug!(module = %result.module.name, "no executable required");
            return Ok(None);
        }
        self.backend.build_executable(result).map(Some)
    }

    /// Build the ahead-of-time form used for persistence.
    pub fn build_serialized(&self, result: &CompilationResult) -> Result<Vec<u8>, BackendError> {
        self.backend.build_aot(result)
    }

    /// Load a runnable executable back from its ahead-of-time form.
    pub fn load(
        &self,
        result: &CompilationResult,
        aot: &[u8],
    ) -> Result<Option<Arc<dyn Executable>>, BackendError> {
        if !result.needs_executable() {
            return Ok(None);
        }
        self.backend.load_executable(result, aot).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CompileScope, LowerRequest};
    use crate::mock::MockBackend;
    use graphcache_signature::{Argument, DataType, Literal, UnitName};

    fn lower(backend: &MockBackend, args: &[Argument]) -> CompilationResult {
        let unit = UnitName::new("f");
        backend
            .lower(&LowerRequest {
                unit: &unit,
                args,
                scope: CompileScope::Function,
            })
            .unwrap()
    }

    #[test]
    fn test_build_and_reload() {
        let backend = Arc::new(MockBackend::new("cpu"));
        let builder = ExecutableBuilder::new(backend.clone());
        let result = lower(&backend, &[Argument::parameter(DataType::F32, vec![2])]);

        let exe = builder.build(&result).unwrap().unwrap();
        let aot = builder.build_serialized(&result).unwrap();
        let reloaded = builder.load(&result, &aot).unwrap().unwrap();

        assert_eq!(exe.name(), reloaded.name());
        assert_eq!(backend.counters().build_calls, 1);
        assert_eq!(backend.counters().load_calls, 1);
    }

    #[test]
    fn test_constant_only_computation_has_no_executable() {
        let backend = Arc::new(MockBackend::new("cpu"));
        let builder = ExecutableBuilder::new(backend.clone());
        let result = lower(&backend, &[Argument::constant(Literal::scalar_i32(1))]);

        assert!(builder.build(&result).unwrap().is_none());
        assert_eq!(backend.counters().build_calls, 0);
    }
}

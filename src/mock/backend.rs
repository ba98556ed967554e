//! Counting mock backend.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use graphcache_signature::{build_signature, ArgSignature, ArgumentKind, Literal};

use super::failure::{BackendStage, FailureConfig, FailureInjector};
use crate::backend::{
    Backend, BackendError, CompilationResult, Executable, IrModule, LowerRequest,
};

/// Magic prefix of mock AOT blobs.
const AOT_MAGIC: &[u8] = b"MOCKAOT1";

/// Snapshot of backend call counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCounters {
    pub lower_calls: usize,
    pub build_calls: usize,
    pub aot_calls: usize,
    pub load_calls: usize,
}

/// Executable produced by [`MockBackend`].
///
/// Running it checks the input count and echoes the inputs back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockExecutable {
    name: String,
    parameter_count: usize,
}

impl MockExecutable {
    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    fn to_aot(&self) -> Vec<u8> {
        let mut blob = AOT_MAGIC.to_vec();
        blob.extend_from_slice(&(self.parameter_count as u32).to_le_bytes());
        blob.extend_from_slice(self.name.as_bytes());
        blob
    }

    fn from_aot(blob: &[u8]) -> Result<Self, BackendError> {
        let body = blob
            .strip_prefix(AOT_MAGIC)
            .ok_or_else(|| BackendError::Load("bad AOT magic".to_string()))?;
        if body.len() < 4 {
            return Err(BackendError::Load("truncated AOT blob".to_string()));
        }
        let (count, name) = body.split_at(4);
        let parameter_count = u32::from_le_bytes([count[0], count[1], count[2], count[3]]) as usize;
        let name = String::from_utf8(name.to_vec())
            .map_err(|e| BackendError::Load(e.to_string()))?;
        Ok(Self {
            name,
            parameter_count,
        })
    }
}

impl Executable for MockExecutable {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, inputs: &[Literal]) -> Result<Vec<Literal>, BackendError> {
        if inputs.len() != self.parameter_count {
            return Err(BackendError::Execution(format!(
                "expected {} inputs, got {}",
                self.parameter_count,
                inputs.len()
            )));
        }
        Ok(inputs.to_vec())
    }
}

/// Deterministic in-process backend.
///
/// The generated IR is a text rendering of the device, an IR version, the
/// compile scope and the signature. Bumping the IR version with
/// [`MockBackend::set_ir_version`] models a backend upgrade that changes the
/// generated IR for every unit.
#[derive(Debug)]
pub struct MockBackend {
    device_type: String,
    ir_version: AtomicU32,
    failures: Mutex<FailureInjector>,
    lower_calls: AtomicUsize,
    build_calls: AtomicUsize,
    aot_calls: AtomicUsize,
    load_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(device_type: &str) -> Self {
        Self {
            device_type: device_type.to_string(),
            ir_version: AtomicU32::new(1),
            failures: Mutex::new(FailureInjector::new()),
            lower_calls: AtomicUsize::new(0),
            build_calls: AtomicUsize::new(0),
            aot_calls: AtomicUsize::new(0),
            load_calls: AtomicUsize::new(0),
        }
    }

    /// Change the IR version embedded in generated IR.
    pub fn set_ir_version(&self, version: u32) {
        self.ir_version.store(version, Ordering::SeqCst);
    }

    /// Inject a failure or delay into a stage.
    pub fn inject(&self, stage: BackendStage, config: FailureConfig) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .inject(stage, config);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Current call counts.
    pub fn counters(&self) -> MockCounters {
        MockCounters {
            lower_calls: self.lower_calls.load(Ordering::SeqCst),
            build_calls: self.build_calls.load(Ordering::SeqCst),
            aot_calls: self.aot_calls.load(Ordering::SeqCst),
            load_calls: self.load_calls.load(Ordering::SeqCst),
        }
    }

    /// Apply any injected delay, then any injected error.
    fn apply_injection(
        &self,
        stage: BackendStage,
        to_error: fn(String) -> BackendError,
    ) -> Result<(), BackendError> {
        // The injector lock is released before sleeping.
        let injected = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .check(stage);

        let Some(config) = injected else {
            return Ok(());
        };
        if let Some(delay) = config.delay {
            thread::sleep(delay);
        }
        match config.error {
            Some(message) => Err(to_error(message)),
            None => Ok(()),
        }
    }

    fn executable_for(result: &CompilationResult) -> MockExecutable {
        MockExecutable {
            name: result.module.name.clone(),
            parameter_count: result.computed_outputs,
        }
    }
}

impl Backend for MockBackend {
    fn device_type(&self) -> &str {
        &self.device_type
    }

    fn lower(&self, request: &LowerRequest<'_>) -> Result<CompilationResult, BackendError> {
        self.lower_calls.fetch_add(1, Ordering::SeqCst);
        self.apply_injection(BackendStage::Lower, BackendError::Lowering)?;

        let signature = build_signature(request.unit, request.args)
            .map_err(|e| BackendError::Lowering(e.to_string()))?;

        let parameters = signature
            .args
            .iter()
            .filter(|a| matches!(a, ArgSignature::TypeAndShape { .. }))
            .count();
        let side_effecting = request
            .args
            .iter()
            .any(|a| a.kind == ArgumentKind::Resource);

        let text = format!(
            "mock-ir v{}\ndevice {}\nscope {:?}\n{}\n",
            self.ir_version.load(Ordering::SeqCst),
            self.device_type,
            request.scope,
            signature.human_string()
        );

        Ok(CompilationResult {
            module: IrModule {
                name: signature.unit_label(),
                bytes: text.into_bytes(),
            },
            computed_outputs: parameters,
            side_effecting,
        })
    }

    fn build_executable(
        &self,
        result: &CompilationResult,
    ) -> Result<Arc<dyn Executable>, BackendError> {
        self.build_calls.fetch_add(1, Ordering::SeqCst);
        self.apply_injection(BackendStage::Build, BackendError::Codegen)?;
        Ok(Arc::new(Self::executable_for(result)))
    }

    fn build_aot(&self, result: &CompilationResult) -> Result<Vec<u8>, BackendError> {
        self.aot_calls.fetch_add(1, Ordering::SeqCst);
        self.apply_injection(BackendStage::Aot, BackendError::Serialization)?;
        Ok(Self::executable_for(result).to_aot())
    }

    fn load_executable(
        &self,
        _result: &CompilationResult,
        aot: &[u8],
    ) -> Result<Arc<dyn Executable>, BackendError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        self.apply_injection(BackendStage::Load, BackendError::Load)?;
        Ok(Arc::new(MockExecutable::from_aot(aot)?))
    }
}

//! Per-signature cache entries.
//!
//! Entry states: UNCOMPILED → COMPILING → COMPILED, with
//! COMPILING → UNCOMPILED when a compilation fails.
//!
//! The COMPILING state doubles as the in-flight marker: whoever moves an
//! entry into it owns the compilation until it resolves, and runs the
//! backend without holding the entry lock. Compiled artifacts are
//! published through a write-once cell so lookups can read them without
//! taking any lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError, TryLockError};

use graphcache_signature::Signature;
use tracing::{debug, warn};

use crate::backend::{BackendError, CompilationResult, Executable};
use crate::error::{CacheError, CacheResult};

/// Compile state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileState {
    /// No usable artifacts; the next eligible request compiles
    Uncompiled,
    /// A compilation is in flight
    Compiling,
    /// Artifacts are published (terminal)
    Compiled,
}

impl CompileState {
    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: CompileState) -> bool {
        match (self, target) {
            (CompileState::Uncompiled, CompileState::Compiling) => true,

            (CompileState::Compiling, CompileState::Compiled) => true,
            // Failure, abort, or a refused async submission
            (CompileState::Compiling, CompileState::Uncompiled) => true,

            _ => false,
        }
    }
}

/// Outcome of the most recent compilation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CompileStatus {
    /// No attempt has finished yet
    #[default]
    Pending,
    Succeeded,
    Failed(BackendError),
}

/// Where compiled artifacts came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOrigin {
    /// Generated by the backend in this process
    Backend,
    /// Reloaded from the persistent store
    Persisted,
}

/// The immutable result of a successful compilation.
///
/// Cloning is cheap; clones share the same result and executable.
#[derive(Debug, Clone)]
pub struct CompiledArtifacts {
    pub result: Arc<CompilationResult>,
    /// `None` when the computation needs no executable
    pub executable: Option<Arc<dyn Executable>>,
    pub origin: ArtifactOrigin,
}

/// Mutable entry fields, guarded by the entry mutex.
#[derive(Debug)]
pub struct EntryState {
    state: CompileState,
    status: CompileStatus,
}

impl EntryState {
    pub fn state(&self) -> CompileState {
        self.state
    }

    pub fn status(&self) -> &CompileStatus {
        &self.status
    }

    /// Move to `target`, rejecting illegal edges.
    pub(crate) fn transition_to(&mut self, target: CompileState) -> CacheResult<()> {
        if !self.state.can_transition_to(target) {
            return Err(CacheError::InvalidTransition {
                from: self.state,
                to: target,
            });
        }
        self.state = target;
        Ok(())
    }
}

/// One cache entry per signature. Never removed once created.
///
/// The request counter lives outside the mutex so an async request that
/// finds the lock contended is still counted.
#[derive(Debug)]
pub struct Entry {
    signature: Signature,
    requests: AtomicU64,
    state: Mutex<EntryState>,
    resolved: Condvar,
    compiled: OnceLock<CompiledArtifacts>,
}

impl Entry {
    pub fn new(signature: Signature) -> Self {
        Self {
            signature,
            requests: AtomicU64::new(0),
            state: Mutex::new(EntryState {
                state: CompileState::Uncompiled,
                status: CompileStatus::Pending,
            }),
            resolved: Condvar::new(),
            compiled: OnceLock::new(),
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Published artifacts. Lock-free; `Some` exactly when Compiled.
    pub fn compiled(&self) -> Option<&CompiledArtifacts> {
        self.compiled.get()
    }

    /// Count a request and return the new total.
    pub(crate) fn record_request(&self) -> u64 {
        self.requests.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EntryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock without blocking; `None` if another thread holds the lock.
    pub(crate) fn try_lock(&self) -> Option<MutexGuard<'_, EntryState>> {
        match self.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Block until the entry leaves COMPILING.
    pub(crate) fn wait_resolved<'a>(
        &self,
        guard: MutexGuard<'a, EntryState>,
    ) -> MutexGuard<'a, EntryState> {
        self.resolved
            .wait_while(guard, |s| s.state == CompileState::Compiling)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of (state, request count, status).
    pub fn snapshot(&self) -> (CompileState, u64, CompileStatus) {
        let guard = self.lock();
        (guard.state, self.request_count(), guard.status.clone())
    }

    fn publish(&self, artifacts: CompiledArtifacts) -> CacheResult<()> {
        let mut guard = self.lock();
        guard.transition_to(CompileState::Compiled)?;
        // Set before waking anyone: readers that see Compiled also see artifacts.
        if self.compiled.set(artifacts).is_err() {
            warn!(signature = %self.signature, "artifacts already published");
        }
        guard.status = CompileStatus::Succeeded;
        self.resolved.notify_all();
        debug!(signature = %self.signature, "compiled");
        Ok(())
    }

    fn fail(&self, error: BackendError) -> CacheResult<()> {
        let mut guard = self.lock();
        guard.transition_to(CompileState::Uncompiled)?;
        guard.status = CompileStatus::Failed(error);
        self.resolved.notify_all();
        Ok(())
    }
}

/// Ownership of an in-flight compilation.
///
/// Created by the thread that runs the backend after the entry entered
/// COMPILING. If it is dropped without [`InFlight::finish`] (the compile
/// panicked), the entry returns to UNCOMPILED with an aborted failure so
/// waiters wake up.
pub(crate) struct InFlight {
    entry: Option<Arc<Entry>>,
}

impl InFlight {
    pub(crate) fn new(entry: Arc<Entry>) -> Self {
        Self { entry: Some(entry) }
    }

    /// Resolve the compilation and wake waiters.
    pub(crate) fn finish(
        mut self,
        outcome: Result<CompiledArtifacts, BackendError>,
    ) -> CacheResult<CompiledArtifacts> {
        let Some(entry) = self.entry.take() else {
            return Err(CacheError::InvalidTransition {
                from: CompileState::Uncompiled,
                to: CompileState::Compiled,
            });
        };

        match outcome {
            Ok(artifacts) => {
                entry.publish(artifacts.clone())?;
                Ok(artifacts)
            }
            Err(error) => {
                warn!(signature = %entry.signature, %error, "compilation failed");
                entry.fail(error.clone())?;
                Err(CacheError::Compilation(error))
            }
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            warn!(signature = %entry.signature, "compilation aborted");
            let _ = entry.fail(BackendError::Aborted(
                "compilation did not complete".to_string(),
            ));
        }
    }
}

//! Compilation cache coordinator.
//!
//! Maps each (unit, arguments) signature to one entry and drives the entry
//! through UNCOMPILED → COMPILING → COMPILED under one of three policies:
//!
//! - **Strict**: compile inline and block until done
//! - **Lazy**: compile only once a signature has been requested often enough
//! - **Async**: never block; hand the compile to the background pool
//!
//! A compilation lowers the unit through the backend, then tries the
//! persistent store before building an executable, and saves newly built
//! executables back to the store. Store problems are logged and never fail
//! a compile.

use std::fmt::Write as _;
use std::io;
use std::sync::Arc;

use graphcache_signature::{Argument, Signature, UnitName};
use graphcache_store::{PersistedRecord, PersistentCacheKey, PersistentStore};
use tracing::{debug, info, warn};

use crate::backend::{
    Backend, BackendError, CompilationResult, CompileScope, Executable, LowerRequest,
};
use crate::builder::ExecutableBuilder;
use crate::config::{CacheConfig, FailurePolicy};
use crate::entry::{
    ArtifactOrigin, CompileState, CompileStatus, CompiledArtifacts, Entry, EntryState, InFlight,
};
use crate::error::{CacheError, CacheResult};
use crate::pool::{AsyncCompilePool, SubmitError};
use crate::table::EntryTable;

/// Compilation policy for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileMode {
    /// Compile now, blocking the caller
    #[default]
    Strict,
    /// Compile once the signature reaches the lazy threshold
    Lazy,
    /// Schedule a background compile and return immediately
    Async,
}

impl CompileMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Some(CompileMode::Strict),
            "lazy" => Some(CompileMode::Lazy),
            "async" => Some(CompileMode::Async),
            _ => None,
        }
    }
}

/// Why a request returned without artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// Lazy mode: not requested often enough yet
    NotProfitable { request_count: u64, threshold: u64 },
    /// Async mode: a background compile was queued by this request
    Scheduled,
    /// Async mode: a compile is already running, or the entry is busy
    InFlight,
    /// Async mode: the background queue is full; nothing was scheduled
    QueueFull,
}

/// Result of a compile request.
#[derive(Debug, Clone)]
pub enum CompileOutcome {
    Compiled(CompiledArtifacts),
    Miss(MissReason),
}

impl CompileOutcome {
    pub fn artifacts(&self) -> Option<&CompiledArtifacts> {
        match self {
            CompileOutcome::Compiled(artifacts) => Some(artifacts),
            CompileOutcome::Miss(_) => None,
        }
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self, CompileOutcome::Compiled(_))
    }
}

/// A single operation compiled on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpContext {
    pub op_type: String,
    pub attrs: std::collections::BTreeMap<String, String>,
}

impl OpContext {
    pub fn new(op_type: impl Into<String>) -> Self {
        Self {
            op_type: op_type.into(),
            attrs: Default::default(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    fn unit_name(&self) -> UnitName {
        UnitName {
            name: self.op_type.clone(),
            attrs: self.attrs.clone(),
        }
    }
}

/// State shared with background compile jobs.
struct CacheInner {
    config: CacheConfig,
    table: EntryTable,
    backend: Arc<dyn Backend>,
    builder: ExecutableBuilder,
    store: PersistentStore,
}

/// Cache of compiled executables keyed by signature.
///
/// An explicit service object: create one per backend and share it by
/// reference (it is `Send + Sync`). Dropping it waits for queued async
/// compiles to finish.
pub struct CompilationCache {
    inner: Arc<CacheInner>,
    pool: AsyncCompilePool,
}

impl CompilationCache {
    /// Create a cache for `backend`.
    ///
    /// # Arguments
    /// * `config` - Validated here; see [`CacheConfig::validate`]
    /// * `backend` - Code generator used for every compilation
    pub fn new(config: CacheConfig, backend: Arc<dyn Backend>) -> CacheResult<Self> {
        config.validate()?;

        let pool = AsyncCompilePool::new(
            config.async_compile.workers,
            config.async_compile.max_pending,
        )
        .map_err(CacheError::Pool)?;

        let store = PersistentStore::new(config.store_config());
        info!(
            device = backend.device_type(),
            persistence = store.is_enabled(),
            "compilation cache created"
        );

        let inner = CacheInner {
            table: EntryTable::new(),
            builder: ExecutableBuilder::new(Arc::clone(&backend)),
            backend,
            store,
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
            pool,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn device_type(&self) -> &str {
        self.inner.backend.device_type()
    }

    /// Build the signature for a unit and its arguments.
    pub fn build_signature(&self, unit: &UnitName, args: &[Argument]) -> CacheResult<Signature> {
        Ok(graphcache_signature::build_signature(unit, args)?)
    }

    /// Compile `unit` for `args` under `mode`, or return the cached result.
    ///
    /// # Returns
    /// * `Ok(Compiled(_))` - Artifacts are available
    /// * `Ok(Miss(_))` - Lazy or async mode declined to wait
    /// * `Err(Compilation(_))` - This or an earlier sticky compile failed
    /// * `Err(Identity(_))` - The arguments have no valid signature
    pub fn compile(
        &self,
        unit: &UnitName,
        args: &[Argument],
        mode: CompileMode,
    ) -> CacheResult<CompileOutcome> {
        let signature = self.build_signature(unit, args)?;
        let entry = self.inner.table.find_or_create(signature);
        let request = LowerRequest {
            unit,
            args,
            scope: CompileScope::Function,
        };

        match mode {
            CompileMode::Strict => self.compile_blocking(&entry, &request, None),
            CompileMode::Lazy => {
                let threshold = self.inner.config.lazy_compile_threshold;
                self.compile_blocking(&entry, &request, Some(threshold))
            }
            CompileMode::Async => self.compile_async(&entry, unit, args),
        }
    }

    /// Compile a single operation. Always strict.
    pub fn compile_single_op(&self, op: &OpContext, args: &[Argument]) -> CacheResult<CompileOutcome> {
        let unit = op.unit_name();
        let signature = self.build_signature(&unit, args)?;
        let entry = self.inner.table.find_or_create(signature);
        let request = LowerRequest {
            unit: &unit,
            args,
            scope: CompileScope::Op,
        };
        self.compile_blocking(&entry, &request, None)
    }

    /// Artifacts for an already compiled signature.
    ///
    /// Never creates an entry, never changes state and never waits for an
    /// in-flight compile.
    pub fn get_compilation_result_if_already_compiled(
        &self,
        unit: &UnitName,
        args: &[Argument],
    ) -> CacheResult<Option<CompiledArtifacts>> {
        let signature = self.build_signature(unit, args)?;
        Ok(self
            .inner
            .table
            .peek(&signature)
            .and_then(|entry| entry.compiled().cloned()))
    }

    /// Number of entries (signatures seen so far).
    pub fn entry_count(&self) -> usize {
        self.inner.table.len()
    }

    /// State of an existing entry; `None` if the signature was never requested.
    pub fn compile_state(&self, unit: &UnitName, args: &[Argument]) -> CacheResult<Option<CompileState>> {
        Ok(self.peek_entry(unit, args)?.map(|e| e.snapshot().0))
    }

    /// Requests counted for an existing entry.
    pub fn request_count(&self, unit: &UnitName, args: &[Argument]) -> CacheResult<Option<u64>> {
        Ok(self.peek_entry(unit, args)?.map(|e| e.request_count()))
    }

    /// Last compilation status of an existing entry.
    pub fn compile_status(&self, unit: &UnitName, args: &[Argument]) -> CacheResult<Option<CompileStatus>> {
        Ok(self.peek_entry(unit, args)?.map(|e| e.snapshot().2))
    }

    /// Human-readable dump of every entry.
    pub fn debug_string(&self) -> String {
        let entries = self.inner.table.snapshot();
        let mut out = format!(
            "CompilationCache device={} entries={}\n",
            self.device_type(),
            entries.len()
        );
        for entry in entries {
            let (state, requests, status) = entry.snapshot();
            let _ = write!(
                out,
                "  {} state={:?} requests={}",
                entry.signature().human_string(),
                state,
                requests
            );
            if let CompileStatus::Failed(e) = status {
                let _ = write!(out, " error=\"{}\"", e);
            }
            if let Some(artifacts) = entry.compiled() {
                let _ = write!(out, " origin={:?}", artifacts.origin);
            }
            out.push('\n');
        }
        out
    }

    fn peek_entry(&self, unit: &UnitName, args: &[Argument]) -> CacheResult<Option<Arc<Entry>>> {
        let signature = self.build_signature(unit, args)?;
        Ok(self.inner.table.peek(&signature))
    }

    /// Strict and lazy requests. `lazy_threshold` is `None` for strict.
    fn compile_blocking(
        &self,
        entry: &Arc<Entry>,
        request: &LowerRequest<'_>,
        lazy_threshold: Option<u64>,
    ) -> CacheResult<CompileOutcome> {
        let mut guard = entry.lock();
        let request_count = entry.record_request();
        let mut waited = false;

        loop {
            match guard.state() {
                CompileState::Compiled => {
                    drop(guard);
                    return published(entry);
                }
                CompileState::Compiling => {
                    debug!(signature = %entry.signature(), "waiting for in-flight compile");
                    guard = entry.wait_resolved(guard);
                    waited = true;
                }
                CompileState::Uncompiled => {
                    // Waiters report the failure they waited on under either policy.
                    if waited || self.inner.config.failure_policy == FailurePolicy::Sticky {
                        if let Some(error) = recorded_failure(&guard) {
                            return Err(CacheError::Compilation(error));
                        }
                    }

                    if let Some(threshold) = lazy_threshold {
                        if request_count < threshold {
                            return Ok(CompileOutcome::Miss(MissReason::NotProfitable {
                                request_count,
                                threshold,
                            }));
                        }
                    }

                    guard.transition_to(CompileState::Compiling)?;
                    drop(guard);

                    let in_flight = InFlight::new(Arc::clone(entry));
                    let outcome = self.inner.compile_work(request, entry.signature());
                    return in_flight.finish(outcome).map(CompileOutcome::Compiled);
                }
            }
        }
    }

    fn compile_async(
        &self,
        entry: &Arc<Entry>,
        unit: &UnitName,
        args: &[Argument],
    ) -> CacheResult<CompileOutcome> {
        entry.record_request();
        let Some(mut guard) = entry.try_lock() else {
            return Ok(CompileOutcome::Miss(MissReason::InFlight));
        };

        match guard.state() {
            CompileState::Compiled => {
                drop(guard);
                published(entry)
            }
            CompileState::Compiling => Ok(CompileOutcome::Miss(MissReason::InFlight)),
            CompileState::Uncompiled => {
                if self.inner.config.failure_policy == FailurePolicy::Sticky {
                    if let Some(error) = recorded_failure(&guard) {
                        return Err(CacheError::Compilation(error));
                    }
                }

                guard.transition_to(CompileState::Compiling)?;

                let inner = Arc::clone(&self.inner);
                let job_entry = Arc::clone(entry);
                let unit = unit.clone();
                let args = args.to_vec();
                let job = Box::new(move || {
                    let in_flight = InFlight::new(Arc::clone(&job_entry));
                    let request = LowerRequest {
                        unit: &unit,
                        args: &args,
                        scope: CompileScope::Function,
                    };
                    let outcome = inner.compile_work(&request, job_entry.signature());
                    // Failures are recorded on the entry and logged by `finish`.
                    let _ = in_flight.finish(outcome);
                });

                // The entry lock is still held, so nobody observes COMPILING
                // if the submission is refused.
                match self.pool.try_submit(job) {
                    Ok(()) => {
                        debug!(signature = %entry.signature(), "scheduled async compile");
                        Ok(CompileOutcome::Miss(MissReason::Scheduled))
                    }
                    Err(SubmitError::Saturated) => {
                        guard.transition_to(CompileState::Uncompiled)?;
                        debug!(signature = %entry.signature(), "async compile queue full");
                        Ok(CompileOutcome::Miss(MissReason::QueueFull))
                    }
                    Err(SubmitError::ShutDown) => {
                        guard.transition_to(CompileState::Uncompiled)?;
                        Err(CacheError::Pool(io::Error::new(
                            io::ErrorKind::BrokenPipe,
                            SubmitError::ShutDown.to_string(),
                        )))
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for CompilationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilationCache")
            .field("device_type", &self.device_type())
            .field("entries", &self.entry_count())
            .field("workers", &self.pool.worker_count())
            .finish()
    }
}

fn published(entry: &Entry) -> CacheResult<CompileOutcome> {
    entry
        .compiled()
        .cloned()
        .map(CompileOutcome::Compiled)
        .ok_or(CacheError::InvalidTransition {
            from: CompileState::Compiling,
            to: CompileState::Compiled,
        })
}

fn recorded_failure(state: &EntryState) -> Option<BackendError> {
    match state.status() {
        CompileStatus::Failed(error) => Some(error.clone()),
        _ => None,
    }
}

impl CacheInner {
    /// Produce artifacts for one signature. Runs with no lock held.
    fn compile_work(
        &self,
        request: &LowerRequest<'_>,
        signature: &Signature,
    ) -> Result<CompiledArtifacts, BackendError> {
        debug!(%signature, scope = ?request.scope, "compiling");
        let result = Arc::new(self.backend.lower(request)?);

        let key = self.persistent_key(signature, &result);
        if let Some(key) = &key {
            if let Some(artifacts) = self.load_persisted(key, &result) {
                return Ok(artifacts);
            }
        }

        let executable = match &key {
            Some(key) if result.needs_executable() => {
                match self.build_persistable(key, signature, &result) {
                    Some(executable) => Some(executable),
                    None => self.builder.build(&result)?,
                }
            }
            _ => self.builder.build(&result)?,
        };

        Ok(CompiledArtifacts {
            result,
            executable,
            origin: ArtifactOrigin::Backend,
        })
    }

    fn persistent_key(
        &self,
        signature: &Signature,
        result: &CompilationResult,
    ) -> Option<PersistentCacheKey> {
        if !self.store.is_enabled() {
            return None;
        }
        match signature.fingerprint() {
            Ok(fingerprint) => Some(self.store.key_for(
                &fingerprint,
                &result.module.bytes,
                self.backend.device_type(),
            )),
            Err(error) => {
                warn!(%signature, %error, "cannot fingerprint signature; skipping persistence");
                None
            }
        }
    }

    fn load_persisted(
        &self,
        key: &PersistentCacheKey,
        result: &Arc<CompilationResult>,
    ) -> Option<CompiledArtifacts> {
        let record = match self.store.try_load(key, &result.module.bytes) {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(error) => {
                warn!(file = %key.file_name(), %error, "persistent cache read failed");
                return None;
            }
        };

        let aot = match record.aot_bytes() {
            Ok(aot) => aot,
            Err(error) => {
                warn!(file = %key.file_name(), %error, "persisted record has bad payload");
                return None;
            }
        };

        match self.builder.load(result, &aot) {
            Ok(executable) => {
                info!(file = %key.file_name(), "loaded executable from persistent cache");
                Some(CompiledArtifacts {
                    result: Arc::clone(result),
                    executable,
                    origin: ArtifactOrigin::Persisted,
                })
            }
            Err(error) => {
                warn!(file = %key.file_name(), %error, "persisted executable failed to load");
                None
            }
        }
    }

    /// Build through the ahead-of-time form and save it.
    ///
    /// Returns `None` if either step fails; the caller then builds directly
    /// and nothing is persisted.
    fn build_persistable(
        &self,
        key: &PersistentCacheKey,
        signature: &Signature,
        result: &CompilationResult,
    ) -> Option<Arc<dyn Executable>> {
        let aot = match self.builder.build_serialized(result) {
            Ok(aot) => aot,
            Err(error) => {
                warn!(%signature, %error, "AOT build failed; building without persistence");
                return None;
            }
        };

        let executable = match self.builder.load(result, &aot) {
            Ok(Some(executable)) => executable,
            Ok(None) => return None,
            Err(error) => {
                warn!(%signature, %error, "AOT executable failed to load; building without persistence");
                return None;
            }
        };

        let record = PersistedRecord::new(
            key.clone(),
            &signature.human_string(),
            &result.module.bytes,
            &aot,
        );
        match self.store.save(&record) {
            Ok(path) => debug!(path = %path.display(), "persisted executable"),
            Err(error) => warn!(%signature, %error, "failed to persist executable"),
        }
        Some(executable)
    }
}

//! Shared test fixtures
//!
//! This module provides:
//! - The signature corpus (argument specs with expected signatures)
//! - Cache construction over the mock backend
//! - Polling helpers for background compiles

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use graphcache::mock::MockBackend;
use graphcache::{
    Argument, CacheConfig, CompilationCache, CompiledArtifacts, DataType, Literal, UnitName,
};
use tempfile::TempDir;

/// Upper bound for waiting on background work in tests
pub const ASYNC_TIMEOUT: Duration = Duration::from_secs(10);

/// Path to the signature corpus fixture
pub fn signature_corpus_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/signature_corpus.json")
}

/// Signature test case from signature_corpus.json
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SignatureCase {
    pub id: String,
    pub unit: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    pub args: Vec<String>,
    /// Expected human string (accepted cases)
    #[serde(default)]
    pub human: Option<String>,
    /// Expected error kind (rejected cases)
    #[serde(default)]
    pub error: Option<String>,
}

impl SignatureCase {
    pub fn unit_name(&self) -> UnitName {
        UnitName {
            name: self.unit.clone(),
            attrs: self.attrs.clone(),
        }
    }

    pub fn arguments(&self) -> Vec<Argument> {
        self.args
            .iter()
            .map(|spec| {
                graphcache::cli::parse_argument(spec)
                    .unwrap_or_else(|e| panic!("{}: bad arg spec '{}': {}", self.id, spec, e))
            })
            .collect()
    }
}

/// Full signature corpus
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SignatureCorpus {
    pub schema_version: u32,
    pub description: String,
    pub cases: Vec<SignatureCase>,
}

impl SignatureCorpus {
    /// Load corpus from the fixture file
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(signature_corpus_path())?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Cache over a fresh mock backend
pub fn new_cache(config: CacheConfig) -> (CompilationCache, Arc<MockBackend>) {
    let backend = Arc::new(MockBackend::new("cpu"));
    let cache = CompilationCache::new(config, backend.clone()).expect("cache construction");
    (cache, backend)
}

/// Cache over an existing backend
pub fn cache_for(config: CacheConfig, backend: &Arc<MockBackend>) -> CompilationCache {
    CompilationCache::new(config, backend.clone()).expect("cache construction")
}

/// Config persisting into `<temp>/records`
pub fn persistent_config(temp_dir: &TempDir) -> CacheConfig {
    CacheConfig::default().with_persistence(temp_dir.path().join("records"))
}

/// Persisted record files under `<temp>/records`
pub fn record_files(temp_dir: &TempDir) -> Vec<PathBuf> {
    let dir = temp_dir.path().join("records");
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    files.sort();
    files
}

pub fn matmul() -> UnitName {
    UnitName::new("matmul")
}

/// `f32[2,3]` parameter plus an `i32` constant
pub fn matmul_args(constant: i32) -> Vec<Argument> {
    vec![
        Argument::parameter(DataType::F32, vec![2, 3]),
        Argument::constant(Literal::scalar_i32(constant)),
    ]
}

/// Poll until the signature is compiled or the timeout passes
pub fn wait_for_compiled(
    cache: &CompilationCache,
    unit: &UnitName,
    args: &[Argument],
) -> Option<CompiledArtifacts> {
    let deadline = Instant::now() + ASYNC_TIMEOUT;
    while Instant::now() < deadline {
        if let Some(artifacts) = cache
            .get_compilation_result_if_already_compiled(unit, args)
            .expect("valid signature")
        {
            return Some(artifacts);
        }
        thread::sleep(Duration::from_millis(5));
    }
    None
}

/// Poll until `condition` holds or the timeout passes
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + ASYNC_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

//! Persistent cache tests
//!
//! - Compiled executables are saved and reloaded by a fresh cache
//! - Records are only reused when signature, IR and device all match
//! - Store problems never fail a compile

mod fixtures;

use std::fs;
use std::sync::Arc;

use fixtures::{cache_for, matmul, matmul_args, persistent_config, record_files};
use graphcache::mock::{BackendStage, FailureConfig, MockBackend};
use graphcache::{
    Argument, ArtifactOrigin, CacheConfig, CompileMode, Literal, PersistedRecord,
    PersistentStore, UnitName,
};
use tempfile::TempDir;

fn compile_strict(cache: &graphcache::CompilationCache) -> graphcache::CompiledArtifacts {
    cache
        .compile(&matmul(), &matmul_args(1), CompileMode::Strict)
        .expect("compile")
        .artifacts()
        .cloned()
        .expect("compiled")
}

fn read_record(path: &std::path::Path) -> PersistedRecord {
    PersistedRecord::from_json(&fs::read_to_string(path).unwrap()).unwrap()
}

// === Round trip ===

#[test]
fn test_round_trip_skips_build() {
    let temp_dir = TempDir::new().unwrap();

    let first_backend = Arc::new(MockBackend::new("cpu"));
    {
        let cache = cache_for(persistent_config(&temp_dir), &first_backend);
        let artifacts = compile_strict(&cache);
        assert_eq!(artifacts.origin, ArtifactOrigin::Backend);
    }
    // One code generation pass: the executable is loaded from the AOT form.
    let counters = first_backend.counters();
    assert_eq!(counters.build_calls, 0);
    assert_eq!(counters.aot_calls, 1);
    assert_eq!(counters.load_calls, 1);
    assert_eq!(record_files(&temp_dir).len(), 1);

    // A fresh process: new backend, new cache, same directory.
    let second_backend = Arc::new(MockBackend::new("cpu"));
    let cache = cache_for(persistent_config(&temp_dir), &second_backend);
    let artifacts = compile_strict(&cache);

    assert_eq!(artifacts.origin, ArtifactOrigin::Persisted);
    let counters = second_backend.counters();
    assert_eq!(counters.lower_calls, 1);
    assert_eq!(counters.build_calls, 0);
    assert_eq!(counters.load_calls, 1);
    assert_eq!(counters.aot_calls, 0);

    let executable = artifacts.executable.expect("executable");
    let inputs = vec![Literal::from_f32s(vec![2, 3], &[1.0; 6]).unwrap()];
    assert_eq!(executable.run(&inputs).unwrap(), inputs);
}

#[test]
fn test_record_contents() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(MockBackend::new("cpu"));
    let cache = cache_for(persistent_config(&temp_dir), &backend);
    let artifacts = compile_strict(&cache);

    let files = record_files(&temp_dir);
    assert_eq!(files.len(), 1);
    let record = read_record(&files[0]);

    assert_eq!(record.schema_version, graphcache_store::SCHEMA_VERSION);
    assert_eq!(record.schema_id, "graphcache/record@1");
    assert_eq!(record.signature, "matmul: f32[2,3]; const i32[] 1");
    assert_eq!(record.key.device_type, "cpu");
    assert_eq!(record.ir_bytes().unwrap(), artifacts.result.module.bytes);

    let signature = cache.build_signature(&matmul(), &matmul_args(1)).unwrap();
    assert_eq!(record.key.signature_fingerprint, signature.fingerprint().unwrap());
}

#[test]
fn test_prefix_in_file_name() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = persistent_config(&temp_dir);
    config.persistence_prefix = "jit".to_string();

    let backend = Arc::new(MockBackend::new("cpu"));
    compile_strict(&cache_for(config, &backend));

    let files = record_files(&temp_dir);
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("jit__"), "{}", name);
    assert!(name.ends_with("__cpu.json"), "{}", name);
}

#[test]
fn test_async_compile_persists() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(MockBackend::new("cpu"));
    let cache = cache_for(persistent_config(&temp_dir), &backend);

    cache
        .compile(&matmul(), &matmul_args(1), CompileMode::Async)
        .unwrap();
    fixtures::wait_for_compiled(&cache, &matmul(), &matmul_args(1)).expect("compiled");
    drop(cache);

    assert_eq!(record_files(&temp_dir).len(), 1);
}

#[test]
fn test_constant_only_unit_not_persisted() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(MockBackend::new("cpu"));
    let cache = cache_for(persistent_config(&temp_dir), &backend);

    cache
        .compile(
            &UnitName::new("fold"),
            &[Argument::constant(Literal::scalar_i32(2))],
            CompileMode::Strict,
        )
        .unwrap();

    assert!(record_files(&temp_dir).is_empty());
    assert_eq!(backend.counters().aot_calls, 0);
}

#[test]
fn test_persistence_disabled_by_default() {
    let backend = Arc::new(MockBackend::new("cpu"));
    compile_strict(&cache_for(CacheConfig::default(), &backend));
    assert_eq!(backend.counters().aot_calls, 0);
}

// === Staleness ===

#[test]
fn test_ir_change_recompiles() {
    let temp_dir = TempDir::new().unwrap();

    let old_backend = Arc::new(MockBackend::new("cpu"));
    compile_strict(&cache_for(persistent_config(&temp_dir), &old_backend));

    let new_backend = Arc::new(MockBackend::new("cpu"));
    new_backend.set_ir_version(2);
    let artifacts = compile_strict(&cache_for(persistent_config(&temp_dir), &new_backend));

    assert_eq!(artifacts.origin, ArtifactOrigin::Backend);
    assert_eq!(new_backend.counters().aot_calls, 1);
    assert_eq!(new_backend.counters().build_calls, 0);
    // Different IR fingerprint, different file
    assert_eq!(record_files(&temp_dir).len(), 2);
}

#[test]
fn test_other_device_not_reused() {
    let temp_dir = TempDir::new().unwrap();

    let cpu = Arc::new(MockBackend::new("cpu"));
    compile_strict(&cache_for(persistent_config(&temp_dir), &cpu));

    let gpu = Arc::new(MockBackend::new("gpu"));
    let artifacts = compile_strict(&cache_for(persistent_config(&temp_dir), &gpu));

    assert_eq!(artifacts.origin, ArtifactOrigin::Backend);
    assert_eq!(gpu.counters().aot_calls, 1);
}

#[test]
fn test_tampered_ir_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(MockBackend::new("cpu"));
    compile_strict(&cache_for(persistent_config(&temp_dir), &backend));

    // Same key and file name, different stored IR.
    let path = record_files(&temp_dir).remove(0);
    let record = read_record(&path);
    let aot = record.aot_bytes().unwrap();
    let tampered = PersistedRecord::new(record.key.clone(), &record.signature, b"other ir", &aot);
    fs::write(&path, tampered.to_json().unwrap()).unwrap();

    let fresh = Arc::new(MockBackend::new("cpu"));
    let artifacts = compile_strict(&cache_for(persistent_config(&temp_dir), &fresh));
    assert_eq!(artifacts.origin, ArtifactOrigin::Backend);
    assert_eq!(fresh.counters().aot_calls, 1);

    // The rebuilt executable replaced the tampered record.
    assert_eq!(read_record(&path).ir_bytes().unwrap(), artifacts.result.module.bytes);
}

fn write_foreign_signature(temp_dir: &TempDir) {
    let path = record_files(temp_dir).remove(0);
    let mut record = read_record(&path);
    record.key.signature_fingerprint = "0".repeat(64);
    fs::write(&path, record.to_json().unwrap()).unwrap();
}

#[test]
fn test_strict_checks_reject_foreign_signature() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(MockBackend::new("cpu"));
    compile_strict(&cache_for(persistent_config(&temp_dir), &backend));
    write_foreign_signature(&temp_dir);

    let fresh = Arc::new(MockBackend::new("cpu"));
    let artifacts = compile_strict(&cache_for(persistent_config(&temp_dir), &fresh));
    assert_eq!(artifacts.origin, ArtifactOrigin::Backend);
}

#[test]
fn test_relaxed_checks_accept_foreign_signature() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(MockBackend::new("cpu"));
    compile_strict(&cache_for(persistent_config(&temp_dir), &backend));
    write_foreign_signature(&temp_dir);

    let mut config = persistent_config(&temp_dir);
    config.disable_strict_signature_checks = true;
    let fresh = Arc::new(MockBackend::new("cpu"));
    let artifacts = compile_strict(&cache_for(config, &fresh));

    assert_eq!(artifacts.origin, ArtifactOrigin::Persisted);
    assert_eq!(fresh.counters().build_calls, 0);
}

// === Store failures ===

#[test]
fn test_corrupt_record_is_a_miss() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(MockBackend::new("cpu"));
    compile_strict(&cache_for(persistent_config(&temp_dir), &backend));

    let path = record_files(&temp_dir).remove(0);
    fs::write(&path, "{ not json").unwrap();

    let fresh = Arc::new(MockBackend::new("cpu"));
    let artifacts = compile_strict(&cache_for(persistent_config(&temp_dir), &fresh));

    assert_eq!(artifacts.origin, ArtifactOrigin::Backend);
    assert_eq!(fresh.counters().aot_calls, 1);
    // Overwritten with a valid record
    assert!(PersistedRecord::from_json(&fs::read_to_string(&path).unwrap()).is_ok());
}

#[test]
fn test_save_failure_keeps_result() {
    let temp_dir = TempDir::new().unwrap();
    // The configured directory is a regular file, so every save fails.
    let blocker = temp_dir.path().join("records");
    fs::write(&blocker, "not a directory").unwrap();

    let backend = Arc::new(MockBackend::new("cpu"));
    let cache = cache_for(persistent_config(&temp_dir), &backend);
    let artifacts = compile_strict(&cache);

    assert_eq!(artifacts.origin, ArtifactOrigin::Backend);
    assert!(artifacts.executable.is_some());
    assert_eq!(backend.counters().aot_calls, 1);

    // The in-memory entry still serves later requests.
    let again = compile_strict(&cache);
    assert!(Arc::ptr_eq(&again.result, &artifacts.result));
    assert_eq!(backend.counters().lower_calls, 1);
}

#[test]
fn test_aot_failure_not_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(MockBackend::new("cpu"));
    backend.inject(BackendStage::Aot, FailureConfig::error("not serializable"));

    let artifacts = compile_strict(&cache_for(persistent_config(&temp_dir), &backend));

    assert_eq!(artifacts.origin, ArtifactOrigin::Backend);
    assert!(artifacts.executable.is_some());
    assert_eq!(backend.counters().build_calls, 1);
    assert!(record_files(&temp_dir).is_empty());
}

#[test]
fn test_load_failure_falls_back_to_build() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(MockBackend::new("cpu"));
    compile_strict(&cache_for(persistent_config(&temp_dir), &backend));

    let fresh = Arc::new(MockBackend::new("cpu"));
    fresh.inject(BackendStage::Load, FailureConfig::error("incompatible runtime"));
    let artifacts = compile_strict(&cache_for(persistent_config(&temp_dir), &fresh));

    assert_eq!(artifacts.origin, ArtifactOrigin::Backend);
    // Persisted load, then the load of the fresh AOT form, both refused.
    assert_eq!(fresh.counters().load_calls, 2);
    assert_eq!(fresh.counters().aot_calls, 1);
    assert_eq!(fresh.counters().build_calls, 1);
}

// === Inspection ===

#[test]
fn test_store_listing_and_stats() {
    let temp_dir = TempDir::new().unwrap();
    let config = persistent_config(&temp_dir);
    let backend = Arc::new(MockBackend::new("cpu"));
    let cache = cache_for(config.clone(), &backend);

    for constant in 0..3 {
        cache
            .compile(&matmul(), &matmul_args(constant), CompileMode::Strict)
            .unwrap();
    }
    fs::write(temp_dir.path().join("records/junk.json"), "garbage").unwrap();

    let store = PersistentStore::new(config.store_config());
    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 4);
    assert_eq!(listed.iter().filter(|(_, r)| r.is_none()).count(), 1);

    let stats = store.stats().unwrap();
    assert_eq!(stats.count, 4);
    assert_eq!(stats.invalid_count, 1);
    assert!(stats.total_size_bytes > 0);
}

//! Directory-backed record store.
//!
//! Writes are atomic (write to a temp file, then rename), so a concurrent
//! reader never sees a partially written record and two processes saving the
//! same key simply race to an identical result.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult, VerifyError};
use crate::key::{ir_fingerprint, PersistentCacheKey};
use crate::record::{PersistedRecord, SCHEMA_VERSION};

/// Temp directory name for atomic writes.
const TEMP_DIR: &str = ".tmp";

/// Configuration for the persistent store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Record directory; `None` disables persistence
    pub directory: Option<PathBuf>,
    /// File name prefix for records
    pub prefix: String,
    /// Compare the embedded signature fingerprint on load
    pub strict_signature_checks: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: None,
            prefix: String::new(),
            strict_signature_checks: true,
        }
    }
}

/// Persistent store statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of record files
    pub count: usize,
    /// Record files that could not be parsed
    pub invalid_count: usize,
    /// Total size in bytes
    pub total_size_bytes: u64,
}

/// Persistent store for compiled artifacts.
#[derive(Debug, Clone)]
pub struct PersistentStore {
    config: StoreConfig,
}

impl PersistentStore {
    /// Create a store. No filesystem access happens until first use.
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Whether a directory is configured.
    pub fn is_enabled(&self) -> bool {
        self.config.directory.is_some()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Key for a compilation, named with this store's prefix.
    pub fn key_for(
        &self,
        signature_fingerprint: &str,
        ir: &[u8],
        device_type: &str,
    ) -> PersistentCacheKey {
        PersistentCacheKey::new(&self.config.prefix, signature_fingerprint, ir, device_type)
    }

    /// Path a record with this key is stored at.
    pub fn record_path(&self, key: &PersistentCacheKey) -> Option<PathBuf> {
        self.config
            .directory
            .as_ref()
            .map(|dir| dir.join(key.file_name()))
    }

    /// Look up a record for `key` and validate it against `ir`.
    ///
    /// # Returns
    /// * `Ok(Some(record))` - A record exists and matches the key and IR
    /// * `Ok(None)` - No record, persistence disabled, or the record is stale
    /// * `Err(_)` - The record could not be read or parsed
    pub fn try_load(
        &self,
        key: &PersistentCacheKey,
        ir: &[u8],
    ) -> StoreResult<Option<PersistedRecord>> {
        let Some(path) = self.record_path(key) else {
            return Ok(None);
        };

        if !path.exists() {
            debug!(path = %path.display(), "no persisted record");
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let record = PersistedRecord::from_json(&content).map_err(|e| StoreError::InvalidRecord {
            path: path.clone(),
            message: e.to_string(),
        })?;

        match self.verify(key, ir, &record) {
            Ok(()) => {
                debug!(path = %path.display(), "loaded persisted record");
                Ok(Some(record))
            }
            Err(reason) => {
                warn!(path = %path.display(), %reason, "ignoring stale persisted record");
                Ok(None)
            }
        }
    }

    /// Check that `record` was produced for `key` from exactly `ir`.
    ///
    /// The signature fingerprint is only compared when strict signature
    /// checks are enabled; the IR is always compared.
    pub fn verify(
        &self,
        key: &PersistentCacheKey,
        ir: &[u8],
        record: &PersistedRecord,
    ) -> Result<(), VerifyError> {
        if record.schema_version != SCHEMA_VERSION {
            return Err(VerifyError::SchemaVersion {
                expected: SCHEMA_VERSION,
                found: record.schema_version,
            });
        }

        let stored = &record.key;
        if self.config.strict_signature_checks
            && stored.signature_fingerprint != key.signature_fingerprint
        {
            return Err(VerifyError::SignatureMismatch {
                expected: key.signature_fingerprint.clone(),
                found: stored.signature_fingerprint.clone(),
            });
        }

        if stored.ir_fingerprint != key.ir_fingerprint {
            return Err(VerifyError::IrFingerprintMismatch {
                expected: key.ir_fingerprint.clone(),
                found: stored.ir_fingerprint.clone(),
            });
        }

        if stored.device_type != key.device_type {
            return Err(VerifyError::DeviceMismatch {
                expected: key.device_type.clone(),
                found: stored.device_type.clone(),
            });
        }

        let stored_ir = record.ir_bytes().map_err(|_| VerifyError::IrUndecodable)?;
        if stored_ir != ir || ir_fingerprint(&stored_ir) != key.ir_fingerprint {
            return Err(VerifyError::IrContentMismatch);
        }

        Ok(())
    }

    /// Save a record, overwriting any existing record with the same key.
    ///
    /// Returns the final record path.
    pub fn save(&self, record: &PersistedRecord) -> StoreResult<PathBuf> {
        let dir = self.config.directory.as_ref().ok_or(StoreError::NotConfigured)?;
        let final_path = dir.join(record.key.file_name());

        let temp_dir = dir.join(TEMP_DIR);
        fs::create_dir_all(&temp_dir)?;
        let temp_path = temp_dir.join(format!(".tmp.{}", uuid::Uuid::new_v4()));

        let json = record.to_json()?;
        if let Err(e) = fs::write(&temp_path, json) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::Io(e));
        }

        if let Err(e) = fs::rename(&temp_path, &final_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::Io(e));
        }

        debug!(path = %final_path.display(), "saved persisted record");
        Ok(final_path)
    }

    /// List all record files with their parsed contents.
    ///
    /// Unreadable or unparsable files are listed with `None`.
    pub fn list(&self) -> StoreResult<Vec<(PathBuf, Option<PersistedRecord>)>> {
        let Some(dir) = self.config.directory.as_ref() else {
            return Ok(Vec::new());
        };
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let path = entry.path();
            if !is_record_file(&path) {
                continue;
            }

            let record = fs::read_to_string(&path)
                .ok()
                .and_then(|s| PersistedRecord::from_json(&s).ok());
            results.push((path, record));
        }

        results.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(results)
    }

    /// Get store statistics.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let records = self.list()?;
        let mut stats = StoreStats::default();

        for (path, record) in &records {
            stats.count += 1;
            if record.is_none() {
                stats.invalid_count += 1;
            }
            stats.total_size_bytes += fs::metadata(path)?.len();
        }

        Ok(stats)
    }
}

fn is_record_file(path: &Path) -> bool {
    path.extension().map(|e| e == "json").unwrap_or(false)
}

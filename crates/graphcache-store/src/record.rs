//! Persisted record format.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::key::PersistentCacheKey;

/// Schema version for record files
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "graphcache/record@1";

/// One persisted compiled artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Key the record was saved under
    pub key: PersistentCacheKey,

    /// Human-readable signature, for inspection only
    pub signature: String,

    /// Serialized IR (base64)
    pub ir: String,

    /// Ahead-of-time executable blob (base64)
    pub aot: String,

    /// When the record was written
    pub created_at: DateTime<Utc>,
}

impl PersistedRecord {
    /// Create a record for the current schema.
    pub fn new(key: PersistentCacheKey, signature: &str, ir: &[u8], aot: &[u8]) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            key,
            signature: signature.to_string(),
            ir: STANDARD.encode(ir),
            aot: STANDARD.encode(aot),
            created_at: Utc::now(),
        }
    }

    /// Decoded IR bytes.
    pub fn ir_bytes(&self) -> StoreResult<Vec<u8>> {
        Ok(STANDARD.decode(&self.ir)?)
    }

    /// Decoded ahead-of-time blob.
    pub fn aot_bytes(&self) -> StoreResult<Vec<u8>> {
        Ok(STANDARD.decode(&self.aot)?)
    }

    /// Serialize to JSON (pretty printed)
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

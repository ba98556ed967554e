//! Persistent cache keys.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of fingerprint hex characters used in file names.
const FILE_NAME_DIGITS: usize = 16;

/// Separator between file name components.
const SEPARATOR: &str = "__";

/// Identifies one persisted artifact.
///
/// Derived from a signature fingerprint plus a fingerprint of the IR the
/// backend generated for it. Keying on the IR as well as the signature means
/// a record written by an incompatible backend version is never picked up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersistentCacheKey {
    /// Naming prefix from configuration (may be empty)
    pub prefix: String,
    /// SHA-256 hex of the canonical signature
    pub signature_fingerprint: String,
    /// SHA-256 hex of the serialized IR
    pub ir_fingerprint: String,
    /// Device the artifact was built for
    pub device_type: String,
}

impl PersistentCacheKey {
    /// Create a key from its components.
    pub fn new(prefix: &str, signature_fingerprint: &str, ir: &[u8], device_type: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            signature_fingerprint: signature_fingerprint.to_string(),
            ir_fingerprint: ir_fingerprint(ir),
            device_type: device_type.to_string(),
        }
    }

    /// Deterministic, filesystem-safe record file name.
    ///
    /// Format: `[<prefix>__]<sig16>__<ir16>__<device>.json`
    ///
    /// Example: `jit__3f2a9c0d1e4b5a67__9be1c2d3e4f50617__cpu.json`
    pub fn file_name(&self) -> String {
        let mut parts = Vec::with_capacity(4);
        if !self.prefix.is_empty() {
            parts.push(Self::sanitize(&self.prefix));
        }
        parts.push(Self::short(&self.signature_fingerprint));
        parts.push(Self::short(&self.ir_fingerprint));
        parts.push(Self::sanitize(&self.device_type));
        format!("{}.json", parts.join(SEPARATOR))
    }

    fn short(fingerprint: &str) -> String {
        let end = FILE_NAME_DIGITS.min(fingerprint.len());
        Self::sanitize(&fingerprint[..end])
    }

    /// Sanitize a string for filesystem safety.
    ///
    /// - Replaces non-alphanumeric chars (except hyphen) with underscore
    /// - Converts to lowercase for consistency
    fn sanitize(s: &str) -> String {
        s.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

/// SHA-256 hex digest of serialized IR.
pub fn ir_fingerprint(ir: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ir);
    hex::encode(hasher.finalize())
}

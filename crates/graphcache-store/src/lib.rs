//! Durable storage for compiled subgraph artifacts.
//!
//! Each record holds the ahead-of-time form of one compiled executable,
//! together with the key it was saved under and the intermediate
//! representation (IR) it was generated from. Records are addressed by a
//! [`PersistentCacheKey`] derived from the logical signature fingerprint and
//! a fingerprint of the IR, so an artifact is only reused when both match.
//!
//! ## Layout
//!
//! `<directory>/[<prefix>__]<sig16>__<ir16>__<device>.json`
//!
//! ## Validation
//!
//! Loaded records are re-checked against the expected key and the freshly
//! generated IR. Anything that does not match is treated as absent.

mod error;
mod key;
mod record;
mod store;

pub use error::{StoreError, StoreResult, VerifyError};
pub use key::{ir_fingerprint, PersistentCacheKey};
pub use record::{PersistedRecord, SCHEMA_ID, SCHEMA_VERSION};
pub use store::{PersistentStore, StoreConfig, StoreStats};

//! Signature → entry map.
//!
//! The table lock is held only for lookup and insert. Entries are handed
//! out as `Arc`s and stay valid without it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use graphcache_signature::Signature;

use crate::entry::Entry;

/// Concurrent map from signature to entry. Entries are never removed.
#[derive(Debug, Default)]
pub struct EntryTable {
    entries: Mutex<HashMap<Signature, Arc<Entry>>>,
}

impl EntryTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Signature, Arc<Entry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the entry for `signature`, inserting an uncompiled one on miss.
    pub fn find_or_create(&self, signature: Signature) -> Arc<Entry> {
        let mut entries = self.lock();
        if let Some(entry) = entries.get(&signature) {
            return Arc::clone(entry);
        }
        let entry = Arc::new(Entry::new(signature.clone()));
        entries.insert(signature, Arc::clone(&entry));
        entry
    }

    /// Get the entry for `signature` without creating one.
    pub fn peek(&self, signature: &Signature) -> Option<Arc<Entry>> {
        self.lock().get(signature).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// All entries, sorted by signature text for stable output.
    pub fn snapshot(&self) -> Vec<Arc<Entry>> {
        let mut entries: Vec<Arc<Entry>> = self.lock().values().cloned().collect();
        entries.sort_by_cached_key(|e| e.signature().human_string());
        entries
    }
}

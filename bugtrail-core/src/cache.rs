//! Decoded attachment bytes kept for the length of one capture flow
//!
//! Annotation and preview screens ask for the same attachment many times
//! while a draft is being edited. The cache holds decoded bytes keyed by
//! [`AttachmentId`] so large payloads are read once per flow.
//!
//! The cache is unbounded. It must be cleared when the flow ends, on every
//! exit path; [`FlowGuard`] does that on drop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::model::AttachmentId;

/// Process-wide store of decoded attachment bytes, owned by the reporter
#[derive(Debug, Default)]
pub struct AttachmentDataCache {
    entries: Mutex<HashMap<AttachmentId, Arc<[u8]>>>,
}

impl AttachmentDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<AttachmentId, Arc<[u8]>>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store decoded bytes, returning the shared handle
    pub fn put(&self, id: AttachmentId, data: impl Into<Arc<[u8]>>) -> Arc<[u8]> {
        let data = data.into();
        self.lock().insert(id, Arc::clone(&data));
        data
    }

    pub fn get(&self, id: AttachmentId) -> Option<Arc<[u8]>> {
        self.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        tracing::debug!(entries = count, "Cleared attachment data cache");
    }
}

/// Scope of one capture-to-submit flow.
///
/// Clears the cache when dropped, whether the flow was submitted,
/// cancelled, or abandoned after a failure.
#[must_use = "the flow ends (and the cache is cleared) when the guard is dropped"]
#[derive(Debug)]
pub struct FlowGuard {
    cache: Arc<AttachmentDataCache>,
}

impl FlowGuard {
    pub fn new(cache: Arc<AttachmentDataCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &AttachmentDataCache {
        &self.cache
    }

    /// End the flow now
    pub fn finish(self) {}
}

impl Drop for FlowGuard {
    fn drop(&mut self) {
        self.cache.clear();
    }
}

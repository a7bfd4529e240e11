//! Per-worker-thread lazy initialization registry.
//!
//! An explicit replacement for implicit thread-local storage: one slot per
//! worker thread, populated lazily, with lifetime tied to the registry owner
//! rather than to the thread.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

/// A registry of per-thread values, keyed by the calling thread's identity.
///
/// Each thread initializes its value at most once; later lookups from the
/// same thread return the cached `Arc`. Distinct threads initialize
/// independently and never contend beyond the brief map lookup. A failed
/// initialization leaves the slot empty; the caller decides whether the
/// failure is permanent.
pub struct WorkerLocal<T> {
    slots: Mutex<HashMap<ThreadId, Arc<T>>>,
}

impl<T> WorkerLocal<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the calling thread's value, running `init` on first access.
    ///
    /// `init` runs outside the map lock so a slow initialization on one
    /// thread does not block first access on another. Only the owning thread
    /// ever inserts its own key, so `init` runs at most once per thread.
    pub fn get_or_try_init<E>(
        &self,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        let id = thread::current().id();
        if let Some(value) = self.slots.lock().get(&id) {
            return Ok(Arc::clone(value));
        }

        let value = Arc::new(init()?);
        self.slots.lock().insert(id, Arc::clone(&value));
        Ok(value)
    }

    /// Seeds the calling thread's slot with an already-built value.
    pub fn set(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.slots
            .lock()
            .insert(thread::current().id(), Arc::clone(&value));
        value
    }

    /// Number of threads holding an initialized value.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns true if no thread has initialized a value yet.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

impl<T> Default for WorkerLocal<T> {
    fn default() -> Self {
        Self::new()
    }
}

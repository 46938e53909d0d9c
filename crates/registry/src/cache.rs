use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Remembers whether fully qualified image references exist in the registry.
///
/// Shared by every task of a run. Entries are filled lazily by existence checks and removed
/// right before the image is pushed.
#[derive(Debug, Default)]
pub struct PushCache {
    entries: Mutex<HashMap<String, bool>>,
}

impl PushCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, bool>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, image: &str) -> Option<bool> {
        self.lock().get(image).copied()
    }

    pub fn insert(&self, image: impl Into<String>, exists: bool) {
        self.lock().insert(image.into(), exists);
    }

    /// Forgets `image`. Returns the value that was cached, if any.
    pub fn invalidate(&self, image: &str) -> Option<bool> {
        self.lock().remove(image)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per record identifier, so that deliveries for the same
/// record run their read-modify-write one at a time. Entries are dropped once
/// nobody holds or waits for them.
#[derive(Default)]
pub struct RecordLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

pub struct RecordGuard<'a> {
    locks: &'a RecordLocks,
    record_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, record_id: &str) -> RecordGuard<'_> {
        // Entries are only cloned while the map is locked, which lets Drop
        // decide from the reference count whether anyone else still needs it.
        let entry = self
            .locks
            .lock()
            .entry(record_id.to_string())
            .or_default()
            .clone();

        RecordGuard {
            locks: self,
            record_id: record_id.to_string(),
            guard: Some(entry.lock_owned().await),
        }
    }

    /// Number of identifiers with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        let entry = OwnedMutexGuard::mutex(&guard).clone();
        drop(guard);

        let mut locks = self.locks.locks.lock();
        // One reference in the map, one in `entry`.
        if Arc::strong_count(&entry) == 2 {
            locks.remove(&self.record_id);
        }
    }
}

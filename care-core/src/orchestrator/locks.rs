//! Per-subject serialization
//!
//! Requests for different subjects never contend. Requests for the same
//! subject take turns on a lightweight async mutex. The registry only holds
//! weak references, so a subject's mutex disappears once nobody uses it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::SubjectId;

/// Prune dead entries once the map grows past this many subjects
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Default)]
pub struct SubjectLocks {
    locks: Mutex<HashMap<SubjectId, Weak<AsyncMutex<()>>>>,
}

impl SubjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `subject_id`
    pub async fn lock(&self, subject_id: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            if locks.len() >= PRUNE_THRESHOLD {
                locks.retain(|_, weak| weak.strong_count() > 0);
            }
            match locks.get(subject_id).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let fresh = Arc::new(AsyncMutex::new(()));
                    locks.insert(subject_id.to_string(), Arc::downgrade(&fresh));
                    fresh
                }
            }
        };
        mutex.lock_owned().await
    }

    /// Subjects with a live mutex
    pub fn active(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.values().filter(|w| w.strong_count() > 0).count()
    }
}

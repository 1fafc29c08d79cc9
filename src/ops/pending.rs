use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// A node already has an operation in flight.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("position {0} has an operation in flight")]
pub struct BusyConflict(pub String);

/// Per-node in-flight markers for the current session.
///
/// Owned by whoever dispatches mutations; nothing here is global, so each
/// test can build its own.
#[derive(Debug, Default)]
pub struct PendingOperationTracker {
    busy: Mutex<HashSet<String>>,
}

impl PendingOperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // A poisoned set is still a valid set of ids.
        self.busy.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark every id busy, or none of them if any is already busy.
    pub fn begin(&self, ids: &[&str]) -> Result<(), BusyConflict> {
        let mut busy = self.lock();
        if let Some(taken) = ids.iter().find(|id| busy.contains(**id)) {
            return Err(BusyConflict(taken.to_string()));
        }
        for id in ids {
            busy.insert(id.to_string());
        }
        Ok(())
    }

    /// Clear the marks for these ids.
    pub fn end(&self, ids: &[&str]) {
        let mut busy = self.lock();
        for id in ids {
            busy.remove(*id);
        }
    }

    pub fn is_busy(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    /// Number of ids currently marked
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// [`begin`](Self::begin), returning a guard that ends on drop.
    pub fn try_begin(&self, ids: &[&str]) -> Result<PendingGuard<'_>, BusyConflict> {
        let mut owned: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            if !owned.iter().any(|o| o == id) {
                owned.push(id.to_string());
            }
        }
        let refs: Vec<&str> = owned.iter().map(String::as_str).collect();
        self.begin(&refs)?;
        Ok(PendingGuard {
            tracker: self,
            ids: owned,
        })
    }
}

/// Clears its ids from the tracker when dropped, on every exit path.
#[derive(Debug)]
pub struct PendingGuard<'a> {
    tracker: &'a PendingOperationTracker,
    ids: Vec<String>,
}

impl PendingGuard<'_> {
    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let refs: Vec<&str> = self.ids.iter().map(String::as_str).collect();
        self.tracker.end(&refs);
    }
}

//! In-flight request table
//!
//! Every entry is removed exactly once. Reply delivery, timeout and
//! disconnect all go through `take`, so whichever comes first owns the
//! sender and the others find nothing.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::TransportError;
use crate::protocol::Response;

pub(crate) type Outcome = Result<Response, TransportError>;

#[derive(Default)]
pub(crate) struct PendingTable {
    entries: Mutex<HashMap<String, oneshot::Sender<Outcome>>>,
}

impl PendingTable {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<Outcome>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiter. Ids are unique per transport, so an existing entry
    /// is never replaced.
    pub(crate) fn register(&self, id: &str) -> Option<oneshot::Receiver<Outcome>> {
        let mut entries = self.entries();
        if entries.contains_key(id) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        entries.insert(id.to_string(), tx);
        Some(rx)
    }

    pub(crate) fn take(&self, id: &str) -> Option<oneshot::Sender<Outcome>> {
        self.entries().remove(id)
    }

    /// Resolve `id` if it is still pending. Returns false when someone else
    /// already took it.
    pub(crate) fn resolve(&self, id: &str, outcome: Outcome) -> bool {
        match self.take(id) {
            Some(tx) => {
                // The waiter may have been dropped; the entry is gone either way.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Resolve every pending entry with `Disconnected`
    pub(crate) fn fail_all(&self) -> usize {
        let drained: Vec<_> = self.entries().drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(TransportError::Disconnected));
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }
}

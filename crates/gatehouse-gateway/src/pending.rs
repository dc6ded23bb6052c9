//! In-memory waiter map for pending approvals.
//!
//! Maps request ids to the oneshot senders their request tasks await on.
//! This is a delivery optimization only — correctness (exactly one
//! terminal transition) lives in the store's conditional update. A
//! resolution that finds no waiter here simply completes offline.

use std::collections::HashMap;
use std::sync::Mutex;

use gatehouse_messenger::Verdict;
use tokio::sync::oneshot;

/// Registry of request tasks awaiting a verdict.
#[derive(Debug, Default)]
pub(crate) struct PendingWaiters {
    map: Mutex<HashMap<String, oneshot::Sender<Verdict>>>,
}

impl PendingWaiters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a waiter, returning the receiver the request task awaits.
    ///
    /// Registering over an existing id replaces (and thereby cancels) the
    /// previous waiter; the duplicate-id guard upstream makes that case
    /// unreachable in practice.
    pub(crate) fn register(&self, request_id: &str) -> oneshot::Receiver<Verdict> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut map) = self.map.lock() {
            map.insert(request_id.to_string(), tx);
        }
        rx
    }

    /// Take the waiter for an id, if any. The winner of `resolve_pending`
    /// calls this exactly once.
    pub(crate) fn take(&self, request_id: &str) -> Option<oneshot::Sender<Verdict>> {
        self.map.lock().ok().and_then(|mut map| map.remove(request_id))
    }

    /// Drop a waiter without resolving (failed insert or prompt send).
    pub(crate) fn discard(&self, request_id: &str) {
        if let Ok(mut map) = self.map.lock() {
            map.remove(request_id);
        }
    }
}

//! Tracks pending watchdog keepalive-confirmation prompts by run id.
//!
//! When the watchdog fires on a channel that supports interactive
//! confirmation, the run process registers a receiver here before sending
//! the "Keep waiting" / "Stop run" prompt, then awaits it. Whatever surface
//! receives the user's reply resolves it through [`KeepaliveMap::resolve`].

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// How a run's keepalive prompt was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveReply {
    KeepWaiting,
    StopRun,
}

#[derive(Default)]
pub struct KeepaliveMap {
    pending: Mutex<HashMap<String, oneshot::Sender<KeepaliveReply>>>,
}

impl KeepaliveMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending confirmation for `run_id`, returning the receiver
    /// half to await.
    pub fn register(&self, run_id: &str) -> oneshot::Receiver<KeepaliveReply> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(run_id.to_owned(), tx);
        rx
    }

    /// Resolve a pending confirmation for `run_id`, if one is outstanding.
    /// Returns true if a waiter was found and notified.
    pub fn resolve(&self, run_id: &str, reply: KeepaliveReply) -> bool {
        match self.pending.lock().remove(run_id) {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Drop a pending confirmation without resolving it (the wait
    /// concluded some other way, e.g. it timed out).
    pub fn remove(&self, run_id: &str) {
        self.pending.lock().remove(run_id);
    }
}

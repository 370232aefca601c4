//! Cancellation by run id, with group fan-out for subagent cascades.
//!
//! Each running run registers its real [`CancellationToken`] here under its
//! run id. Cancelling by id fires that same token — the one the run
//! process's event loop is already selecting on — so there is exactly one
//! cancellation signal per run, reachable either from the scheduler's
//! session-key lookup (via `RunRegistry`) or from an external run-id-keyed
//! cancel (admin abort, subagent cascade).

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Tracks active cancellation tokens per run id, with group support for
/// cascading parent -> child cancellation.
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancellationToken>>,
    /// parent run id -> set of child run ids.
    groups: Mutex<HashMap<String, HashSet<String>>>,
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelMap {
    pub fn new() -> Self {
        Self { tokens: Mutex::new(HashMap::new()), groups: Mutex::new(HashMap::new()) }
    }

    /// Register the token a running run is already selecting on.
    pub fn register(&self, run_id: &str, token: CancellationToken) {
        self.tokens.lock().insert(run_id.to_owned(), token);
    }

    /// Cancel a running run, cascading to every child in its cancel group.
    /// Returns true if a token was found for `run_id` itself.
    pub fn cancel(&self, run_id: &str) -> bool {
        let found = if let Some(token) = self.tokens.lock().get(run_id) {
            token.cancel();
            true
        } else {
            false
        };

        if let Some(children) = self.groups.lock().get(run_id) {
            let tokens = self.tokens.lock();
            for child_id in children {
                if let Some(child_token) = tokens.get(child_id) {
                    child_token.cancel();
                }
            }
        }

        found
    }

    /// Remove the token for a run (called when the run terminates).
    pub fn remove(&self, run_id: &str) {
        self.tokens.lock().remove(run_id);
        self.groups.lock().remove(run_id);
    }

    pub fn is_running(&self, run_id: &str) -> bool {
        self.tokens.lock().contains_key(run_id)
    }

    pub fn add_to_group(&self, parent_run_id: &str, child_run_id: &str) {
        self.groups.lock().entry(parent_run_id.to_owned()).or_default().insert(child_run_id.to_owned());
    }

    pub fn remove_from_group(&self, parent_run_id: &str, child_run_id: &str) {
        let mut groups = self.groups.lock();
        if let Some(children) = groups.get_mut(parent_run_id) {
            children.remove(child_run_id);
            if children.is_empty() {
                groups.remove(parent_run_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_cancel() {
        let map = CancelMap::new();
        let token = CancellationToken::new();
        map.register("r1", token.clone());
        assert!(!token.is_cancelled());
        assert!(map.is_running("r1"));

        assert!(map.cancel("r1"));
        assert!(token.is_cancelled());

        map.remove("r1");
        assert!(!map.is_running("r1"));
        assert!(!map.cancel("r1"));
    }

    #[test]
    fn cancel_cascades_to_children() {
        let map = CancelMap::new();
        let parent = CancellationToken::new();
        let child1 = CancellationToken::new();
        let child2 = CancellationToken::new();
        map.register("parent", parent.clone());
        map.register("child1", child1.clone());
        map.register("child2", child2.clone());

        map.add_to_group("parent", "child1");
        map.add_to_group("parent", "child2");

        map.cancel("parent");
        assert!(parent.is_cancelled());
        assert!(child1.is_cancelled());
        assert!(child2.is_cancelled());
    }

    #[test]
    fn remove_from_group_cleanup() {
        let map = CancelMap::new();
        let p = CancellationToken::new();
        let c = CancellationToken::new();
        map.register("p", p.clone());
        map.register("c", c.clone());

        map.add_to_group("p", "c");
        map.remove_from_group("p", "c");

        map.cancel("p");
        assert!(!c.is_cancelled());
    }

    #[test]
    fn cancel_nonexistent_run_returns_false() {
        let map = CancelMap::new();
        assert!(!map.cancel("does_not_exist"));
    }
}

//! Bounds the pool of concurrently live run processes and exposes the
//! health-check predicate `/healthz` reports under the `run_supervisor` key.
//!
//! Every run process — top-level or subagent — registers here for the
//! lifetime of its attempt loop; registration past `max_children` is
//! refused so a burst of admissions (or a runaway tool loop spawning
//! subagents) can't grow the process count without bound. This is a
//! higher, coarser ceiling than the scheduler's `max_concurrent_runs`
//! admission gate — the scheduler throttles steady-state throughput, this
//! is the backstop against unbounded growth. Cascading cancellation
//! (cancel the parent, cancel every registered child) is delegated to the
//! shared [`CancelMap`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::cancel::CancelMap;

pub struct RunSupervisor {
    cancel_map: Arc<CancelMap>,
    max_children: usize,
    active: AtomicUsize,
}

impl RunSupervisor {
    pub fn new(cancel_map: Arc<CancelMap>, max_children: usize) -> Self {
        Self { cancel_map, max_children, active: AtomicUsize::new(0) }
    }

    pub fn cancel_map(&self) -> &Arc<CancelMap> {
        &self.cancel_map
    }

    /// Claim a slot for `run_id`. Returns false (and claims nothing) once
    /// the pool is at capacity.
    pub fn try_register(&self, run_id: &str) -> bool {
        if self.active.fetch_add(1, Ordering::AcqRel) >= self.max_children {
            self.active.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        let _ = run_id;
        true
    }

    /// Claim a slot for `child_run_id` and, on success, register it as a
    /// cascading subagent of `parent_run_id` — cancelling the parent
    /// cancels every child registered this way.
    pub fn try_register_child(&self, parent_run_id: &str, child_run_id: &str) -> bool {
        if !self.try_register(child_run_id) {
            return false;
        }
        self.cancel_map.add_to_group(parent_run_id, child_run_id);
        true
    }

    pub fn release(&self, run_id: &str) {
        let _ = run_id;
        self.active.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn release_child(&self, parent_run_id: &str, child_run_id: &str) {
        self.cancel_map.remove_from_group(parent_run_id, child_run_id);
        self.release(child_run_id);
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Health-check predicate: never over the configured cap.
    pub fn healthy(&self) -> bool {
        self.active_count() <= self.max_children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_up_to_cap_then_refuses() {
        let sup = RunSupervisor::new(Arc::new(CancelMap::new()), 2);
        assert!(sup.try_register("r1"));
        assert!(sup.try_register("r2"));
        assert!(!sup.try_register("r3"));
        assert_eq!(sup.active_count(), 2);
    }

    #[test]
    fn release_frees_capacity() {
        let sup = RunSupervisor::new(Arc::new(CancelMap::new()), 1);
        assert!(sup.try_register("r1"));
        sup.release("r1");
        assert!(sup.try_register("r2"));
    }

    #[test]
    fn healthy_reflects_cap() {
        let sup = RunSupervisor::new(Arc::new(CancelMap::new()), 1);
        assert!(sup.healthy());
        sup.try_register("r1");
        assert!(sup.healthy());
        sup.try_register("r2");
        assert!(!sup.healthy());
    }

    #[test]
    fn child_registration_cascades_cancellation() {
        let cancel_map = Arc::new(CancelMap::new());
        let sup = RunSupervisor::new(Arc::clone(&cancel_map), 5);
        let parent_token = tokio_util::sync::CancellationToken::new();
        let child_token = tokio_util::sync::CancellationToken::new();
        cancel_map.register("parent", parent_token.clone());
        cancel_map.register("child", child_token.clone());

        assert!(sup.try_register_child("parent", "child"));
        cancel_map.cancel("parent");
        assert!(parent_token.is_cancelled());
        assert!(child_token.is_cancelled());

        sup.release_child("parent", "child");
        assert_eq!(sup.active_count(), 0);
    }
}

//! Registry of runs currently live in this process, keyed both by run id
//! (for `/v1/abort` and steer addressing) and by session key (so the
//! scheduler can find "the active run for this session" without needing to
//! know its run id up front — `run_process` is the only thing that
//! allocates a run id, asynchronously, inside `start_run`).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// A live run's addressable handles. Held for the run's lifetime only —
/// coalescer state is not tracked here, since it never needs to be found by
/// anything other than the run process that owns it.
pub struct ActiveRun {
    /// The orchestration-level run id, stable across retries, used for
    /// external addressing (`/v1/abort`, `GET /v1/runs/:run_id`).
    pub run_id: String,
    pub session_key: String,
    pub engine_id: String,
    /// The engine adapter's own handle for this run, passed back into
    /// `cancel`/`steer` calls against that adapter.
    pub engine_handle: orc_providers::RunHandle,
    pub cancel: CancellationToken,
    /// Present only when the engine adapter reports `supports_steer() ==
    /// true`; forwards steer text into the in-flight run.
    pub steer_tx: Option<UnboundedSender<String>>,
}

#[derive(Default)]
pub struct RunRegistry {
    by_run_id: RwLock<HashMap<String, Arc<ActiveRun>>>,
    by_session_key: RwLock<HashMap<String, String>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, run: Arc<ActiveRun>) {
        self.by_session_key.write().insert(run.session_key.clone(), run.run_id.clone());
        self.by_run_id.write().insert(run.run_id.clone(), run);
    }

    pub fn get_by_run_id(&self, run_id: &str) -> Option<Arc<ActiveRun>> {
        self.by_run_id.read().get(run_id).cloned()
    }

    pub fn get_by_session_key(&self, session_key: &str) -> Option<Arc<ActiveRun>> {
        let run_id = self.by_session_key.read().get(session_key).cloned()?;
        self.get_by_run_id(&run_id)
    }

    pub fn unregister(&self, run_id: &str) {
        if let Some(run) = self.by_run_id.write().remove(run_id) {
            let mut by_session = self.by_session_key.write();
            if by_session.get(&run.session_key).map(|s| s.as_str()) == Some(run_id) {
                by_session.remove(&run.session_key);
            }
        }
    }

    pub fn active_run_count(&self) -> usize {
        self.by_run_id.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(run_id: &str, session_key: &str) -> Arc<ActiveRun> {
        Arc::new(ActiveRun {
            run_id: run_id.into(),
            session_key: session_key.into(),
            engine_id: "lemon".into(),
            engine_handle: orc_providers::RunHandle::new(run_id.to_string()),
            cancel: CancellationToken::new(),
            steer_tx: None,
        })
    }

    #[test]
    fn register_and_lookup_both_directions() {
        let reg = RunRegistry::new();
        reg.register(run("r1", "s1"));
        assert_eq!(reg.get_by_run_id("r1").unwrap().session_key, "s1");
        assert_eq!(reg.get_by_session_key("s1").unwrap().run_id, "r1");
    }

    #[test]
    fn unregister_clears_both_indexes() {
        let reg = RunRegistry::new();
        reg.register(run("r1", "s1"));
        reg.unregister("r1");
        assert!(reg.get_by_run_id("r1").is_none());
        assert!(reg.get_by_session_key("s1").is_none());
    }

    #[test]
    fn unregister_does_not_clobber_a_newer_run_for_the_same_session() {
        let reg = RunRegistry::new();
        reg.register(run("r1", "s1"));
        reg.register(run("r2", "s1"));
        reg.unregister("r1");
        assert_eq!(reg.get_by_session_key("s1").unwrap().run_id, "r2");
    }

    #[test]
    fn active_run_count_tracks_registrations() {
        let reg = RunRegistry::new();
        assert_eq!(reg.active_run_count(), 0);
        reg.register(run("r1", "s1"));
        reg.register(run("r2", "s2"));
        assert_eq!(reg.active_run_count(), 2);
        reg.unregister("r1");
        assert_eq!(reg.active_run_count(), 1);
    }
}

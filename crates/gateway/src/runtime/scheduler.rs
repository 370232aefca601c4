//! Per-session job admission, generalized from a single FIFO semaphore into
//! the five queue modes a [`Job`] can request (see
//! [`orc_domain::model::QueueMode`]).
//!
//! Exactly one worker task drives each session with outstanding work; a
//! single mutex guards both "is a worker already running for this session"
//! and "what should the next dispatched job be", so spawning a new worker
//! and a worker's own empty-queue exit can never race each other.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use orc_domain::model::{Job, QueueMode};

use super::run_process::{self, RunDeps};

#[derive(Default)]
struct SessionWorkerState {
    queue: VecDeque<Job>,
    followup: Option<Job>,
}

pub struct Scheduler {
    workers: Mutex<HashMap<String, SessionWorkerState>>,
    permits: Arc<Semaphore>,
    deps: Arc<RunDeps>,
}

impl Scheduler {
    pub fn new(deps: Arc<RunDeps>, max_concurrent_runs: u32) -> Arc<Self> {
        Arc::new(Self {
            workers: Mutex::new(HashMap::new()),
            permits: Arc::new(Semaphore::new(max_concurrent_runs as usize)),
            deps,
        })
    }

    /// Admit `job` against its session's queue per its `queue_mode`
    /// (defaulting to `Collect` if unset).
    pub fn enqueue(self: &Arc<Self>, job: Job) {
        let mode = job.queue_mode.unwrap_or(QueueMode::Collect);
        match mode {
            QueueMode::Collect => self.enqueue_collect(job),
            QueueMode::Followup => self.enqueue_followup(job),
            QueueMode::Steer => self.enqueue_steer(job, false),
            QueueMode::SteerBacklog => self.enqueue_steer(job, true),
            QueueMode::Interrupt => self.enqueue_interrupt(job),
        }
    }

    fn enqueue_collect(self: &Arc<Self>, job: Job) {
        let session_key = job.session_key.clone();
        self.push_and_maybe_spawn(session_key, |state| state.queue.push_back(job));
    }

    fn enqueue_followup(self: &Arc<Self>, job: Job) {
        let session_key = job.session_key.clone();
        self.push_and_maybe_spawn(session_key, |state| state.followup = Some(job));
    }

    fn enqueue_interrupt(self: &Arc<Self>, job: Job) {
        if let Some(active) = self.deps.runs.get_by_session_key(&job.session_key) {
            active.cancel.cancel();
        }
        self.enqueue_followup(job);
    }

    fn enqueue_steer(self: &Arc<Self>, job: Job, with_backlog: bool) {
        let session_key = job.session_key.clone();
        let Some(active) = self.deps.runs.get_by_session_key(&session_key) else {
            tracing::debug!(session_key, "steer requested with no active run, degrading to followup");
            self.enqueue_followup(job);
            return;
        };
        let steerable = active.steer_tx.as_ref().filter(|_| {
            self.deps.engines.get(&active.engine_id).map(|e| e.supports_steer()).unwrap_or(false)
        });
        let Some(tx) = steerable else {
            tracing::debug!(session_key, engine = %active.engine_id, "engine does not support steering, degrading to followup");
            self.enqueue_followup(job);
            return;
        };

        let mut text = job.text.clone();
        if with_backlog {
            let mut workers = self.workers.lock();
            if let Some(state) = workers.get_mut(&session_key) {
                if !state.queue.is_empty() {
                    let backlog: Vec<String> = state.queue.drain(..).map(|j| j.text).collect();
                    text = format!("{}\n{}", backlog.join("\n"), text);
                }
            }
        }

        if tx.send(text).is_err() {
            tracing::debug!(session_key, "steer channel closed, degrading to followup");
            self.enqueue_followup(job);
        }
    }

    /// Push into the session's worker state via `f`, spawning a driver task
    /// only when this call creates a brand-new entry (decided under the same
    /// lock a finishing worker uses to remove itself).
    fn push_and_maybe_spawn(self: &Arc<Self>, session_key: String, f: impl FnOnce(&mut SessionWorkerState)) {
        let spawn_needed = {
            let mut workers = self.workers.lock();
            let is_new = !workers.contains_key(&session_key);
            let state = workers.entry(session_key.clone()).or_default();
            f(state);
            is_new
        };
        if spawn_needed {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.drive(session_key).await });
        }
    }

    /// Drive one session's queue to exhaustion, serializing one run at a
    /// time. Exits (and removes the session's worker entry) once both the
    /// followup slot and the backlog queue are empty.
    async fn drive(self: Arc<Self>, session_key: String) {
        loop {
            let next = {
                let mut workers = self.workers.lock();
                let Some(state) = workers.get_mut(&session_key) else { return };
                let job = state.followup.take().or_else(|| state.queue.pop_front());
                match job {
                    Some(job) => Some(job),
                    None => {
                        workers.remove(&session_key);
                        None
                    }
                }
            };
            let Some(job) = next else { return };

            let permit = match self.permits.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            };
            run_process::run(Arc::clone(&self.deps), job).await;
            drop(permit);
        }
    }

    pub fn active_run_count(&self) -> usize {
        self.deps.runs.active_run_count()
    }

    /// Jobs waiting admission across every session (backlog queue plus a
    /// pending followup slot), not counting the one job each worker may
    /// currently be running.
    pub fn queued_count(&self) -> usize {
        self.workers.lock().values().map(|s| s.queue.len() + s.followup.is_some() as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::channel_adapter::default_adapter;
    use crate::runtime::cancel::CancelMap;
    use crate::runtime::registries::RunRegistry;
    use crate::runtime::run_supervisor::RunSupervisor;
    use crate::runtime::runs::RunStore;
    use orc_domain::config::Config;
    use orc_providers::EngineRegistry;
    use orc_sessions::SessionMetaStore;
    use std::collections::HashMap as StdHashMap;

    fn job(session_key: &str, text: &str, mode: QueueMode) -> Job {
        Job {
            run_id: uuid::Uuid::new_v4().to_string(),
            session_key: session_key.into(),
            text: text.into(),
            user_message_id: "m1".into(),
            resume_token: None,
            engine_hint: Some("lemon".into()),
            model: None,
            cwd: None,
            tool_policy: Default::default(),
            queue_mode: Some(mode),
            meta: StdHashMap::new(),
        }
    }

    fn deps(dir: &tempfile::TempDir) -> Arc<RunDeps> {
        let config = Arc::new(Config::default());
        let engines = Arc::new(EngineRegistry::from_config(&config.engine).unwrap());
        let sessions = Arc::new(SessionMetaStore::new(dir.path()).unwrap());
        let run_store = Arc::new(RunStore::new(dir.path()).unwrap());
        let cancel_map = Arc::new(CancelMap::new());
        let run_supervisor = Arc::new(RunSupervisor::new(Arc::clone(&cancel_map), config.run_supervisor.max_children));
        Arc::new(RunDeps {
            config,
            engines,
            runs: Arc::new(RunRegistry::new()),
            run_store,
            sessions,
            channel_adapter: default_adapter(),
            cancel_map,
            run_supervisor,
            keepalive: Arc::new(crate::runtime::keepalive::KeepaliveMap::new()),
        })
    }

    #[tokio::test]
    async fn collect_jobs_run_sequentially_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(deps(&dir), 2);
        scheduler.enqueue(job("agent:bot1:main", "first", QueueMode::Collect));
        scheduler.enqueue(job("agent:bot1:main", "second", QueueMode::Collect));

        // Give the driver task time to drain both jobs.
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if scheduler.active_run_count() == 0 {
                break;
            }
        }
        assert_eq!(scheduler.active_run_count(), 0);
    }

    #[tokio::test]
    async fn queued_count_reflects_backlog() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(deps(&dir), 1);
        scheduler.enqueue(job("agent:bot1:main", "first", QueueMode::Collect));
        scheduler.enqueue(job("agent:bot1:main", "second", QueueMode::Collect));
        scheduler.enqueue(job("agent:bot1:main", "third", QueueMode::Collect));
        // At least one of the three is still queued behind the active run.
        assert!(scheduler.queued_count() <= 2);

        for _ in 0..100 {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if scheduler.active_run_count() == 0 {
                break;
            }
        }
        assert_eq!(scheduler.queued_count(), 0);
    }

    #[tokio::test]
    async fn steer_with_no_active_run_degrades_to_followup_and_still_runs() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(deps(&dir), 2);
        scheduler.enqueue(job("agent:bot1:main", "steer me", QueueMode::Steer));
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if scheduler.active_run_count() == 0 {
                break;
            }
        }
        assert_eq!(scheduler.active_run_count(), 0);
    }
}

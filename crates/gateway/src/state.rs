//! Shared, cheaply-cloneable handle to every service the HTTP surface needs.
//!
//! Built once in `main` and threaded into the axum router as extractor
//! state; every field is itself an `Arc`, so `AppState::clone()` is a set of
//! pointer bumps, never a deep copy.

use std::sync::Arc;

use orc_domain::config::Config;
use orc_providers::EngineRegistry;
use orc_sessions::SessionMetaStore;

use crate::runtime::cancel::CancelMap;
use crate::runtime::keepalive::KeepaliveMap;
use crate::runtime::orchestrator::Orchestrator;
use crate::runtime::registries::RunRegistry;
use crate::runtime::run_process::RunDeps;
use crate::runtime::run_supervisor::RunSupervisor;
use crate::runtime::runs::RunStore;
use crate::runtime::scheduler::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engines: Arc<EngineRegistry>,
    pub sessions: Arc<SessionMetaStore>,
    pub runs: Arc<RunRegistry>,
    pub run_store: Arc<RunStore>,
    pub scheduler: Arc<Scheduler>,
    pub orchestrator: Arc<Orchestrator>,
    pub run_supervisor: Arc<RunSupervisor>,
    /// SHA-256 of the configured API bearer token. `None` disables
    /// enforcement (dev mode) — see `api::auth::require_api_token`.
    pub api_token_hash: Option<Vec<u8>>,
}

impl AppState {
    /// Assemble the state + its `RunDeps` companion from the already-loaded
    /// config. The two are built together since `RunDeps` borrows several of
    /// the same `Arc`s the state exposes at the API layer.
    pub fn build(
        config: Arc<Config>,
        engines: Arc<EngineRegistry>,
        sessions: Arc<SessionMetaStore>,
        run_store: Arc<RunStore>,
        api_token_hash: Option<Vec<u8>>,
    ) -> Self {
        let runs = Arc::new(RunRegistry::new());
        let cancel_map = Arc::new(CancelMap::new());
        let run_supervisor = Arc::new(RunSupervisor::new(Arc::clone(&cancel_map), config.run_supervisor.max_children));
        let orchestrator =
            Arc::new(Orchestrator::new(Arc::clone(&config), Arc::clone(&engines), Arc::clone(&sessions)));

        let deps = Arc::new(RunDeps {
            config: Arc::clone(&config),
            engines: Arc::clone(&engines),
            runs: Arc::clone(&runs),
            run_store: Arc::clone(&run_store),
            sessions: Arc::clone(&sessions),
            channel_adapter: crate::runtime::channel_adapter::default_adapter(),
            cancel_map,
            run_supervisor: Arc::clone(&run_supervisor),
            keepalive: Arc::new(KeepaliveMap::new()),
        });
        let scheduler = Scheduler::new(deps, config.scheduler.max_concurrent_runs);

        Self {
            config,
            engines,
            sessions,
            runs,
            run_store,
            scheduler,
            orchestrator,
            run_supervisor,
            api_token_hash,
        }
    }
}

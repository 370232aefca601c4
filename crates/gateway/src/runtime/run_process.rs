//! The run state machine: drives one job from admission through a single
//! engine run to a persisted, terminal [`RunRecord`].
//!
//! Owns the event loop that multiplexes engine events, steer forwarding,
//! cancellation, and the watchdog/kill-timeout/idle-flush timers against a
//! single `tokio::select!` — each iteration recomputes the next wake-up from
//! fresh `Instant` deltas so timers never drift relative to each other.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use orc_domain::config::Config;
use orc_domain::model::{Job, QueueMode, RunRecord, RunState};
use orc_domain::stream::{EngineEvent, Usage};
use orc_domain::trace::TraceEvent;
use orc_providers::{EngineAdapter, EngineRegistry, StartOpts};
use orc_sessions::SessionMetaStore;

use super::cancel::CancelMap;
use super::channel_adapter::ChannelAdapter;
use super::compact;
use super::keepalive::{KeepaliveMap, KeepaliveReply};
use super::registries::{ActiveRun, RunRegistry};
use super::run_supervisor::RunSupervisor;
use super::runs::RunStore;
use super::stream_coalescer::{IngestOutcome, StreamCoalescer};
use super::tool_status_coalescer::ToolStatusCoalescer;

/// Transient-failure markers checked against a first-attempt failure's error
/// text before the retry pipeline bumps `retry_count` and re-runs.
const TRANSIENT_ERROR_MARKERS: &[&str] =
    &["timeout", "connection reset", "temporarily unavailable", "rate limit", "assistant error"];

pub struct RunDeps {
    pub config: Arc<Config>,
    pub engines: Arc<EngineRegistry>,
    pub runs: Arc<RunRegistry>,
    pub run_store: Arc<RunStore>,
    pub sessions: Arc<SessionMetaStore>,
    pub channel_adapter: Arc<dyn ChannelAdapter>,
    pub cancel_map: Arc<CancelMap>,
    pub run_supervisor: Arc<RunSupervisor>,
    pub keepalive: Arc<KeepaliveMap>,
}

/// Run `job` to completion, persisting and returning its final [`RunRecord`].
///
/// The run only proceeds if the supervisor's pool has room; past the
/// configured cap the run is rejected immediately with no engine call.
pub async fn run(deps: Arc<RunDeps>, job: Job) -> RunRecord {
    let engine_id = job.engine_hint.clone().unwrap_or_else(|| deps.config.engine.default_engine.clone());
    let run_id = job.run_id.clone();

    let Some(engine) = deps.engines.get(&engine_id) else {
        let mut record = RunRecord::new(&run_id, &job.session_key, &engine_id);
        record.finish(false, None, Some(format!("unknown engine: {engine_id}")));
        let _ = deps.run_store.upsert(record.clone());
        return record;
    };

    if !deps.run_supervisor.try_register(&run_id) {
        let mut record = RunRecord::new(&run_id, &job.session_key, &engine_id);
        record.finish(false, None, Some("run supervisor at capacity".into()));
        let _ = deps.run_store.upsert(record.clone());
        return record;
    }

    let mut record = RunRecord::new(&run_id, &job.session_key, &engine_id);
    record.state = RunState::Registered;
    let _ = deps.run_store.upsert(record.clone());
    TraceEvent::RunAdmitted {
        run_id: run_id.clone(),
        session_key: job.session_key.clone(),
        queue_mode: format!("{:?}", job.queue_mode.unwrap_or(QueueMode::Collect)),
    }
    .emit();
    TraceEvent::RunStarted { run_id: run_id.clone(), session_key: job.session_key.clone(), engine: engine_id.clone() }
        .emit();

    let max_attempts = deps.config.retry.max_attempts.max(1);
    let mut stream_coalescer = StreamCoalescer::new(deps.config.stream_coalescer.clone());
    let mut tool_coalescer = ToolStatusCoalescer::new(deps.config.tool_status.clone());
    record.state = RunState::Streaming;

    let terminal = loop {
        let is_retry = record.retry_count > 0;
        let ev = execute_attempt(&deps, &engine, &job, &run_id, &mut stream_coalescer, &mut tool_coalescer, is_retry).await;

        if let EngineEvent::Completed { ok, ref answer, ref error, .. } = ev {
            let transient = !ok && answer.is_empty() && error.as_deref().map(is_transient_error).unwrap_or(false);
            if transient && record.retry_count < max_attempts {
                record.retry_count += 1;
                TraceEvent::RetryScheduled { run_id: run_id.clone(), attempt: record.retry_count }.emit();
                continue;
            }
        }
        break ev;
    };

    let (ok, answer, error, usage, resume_token) = match terminal {
        EngineEvent::Completed { ok, answer, error, usage, resume_token } => (ok, answer, error, usage, resume_token),
        _ => (false, String::new(), Some("engine ended without a terminal event".into()), Usage::default(), None),
    };

    if compact::should_schedule(usage.context_ratio, error.as_deref(), &deps.config.compaction) {
        deps.sessions.set_pending_compaction(&job.session_key);
        TraceEvent::CompactionScheduled { session_key: job.session_key.clone(), reason: "usage ratio or overflow error".into() }
            .emit();
        record.pending_compaction = true;
    }

    let final_stream = stream_coalescer.finalize();
    if !final_stream.is_empty() {
        deps.channel_adapter
            .emit_stream_output(&job.session_key, &run_id, stream_coalescer.version(), &final_stream)
            .await;
    }
    if !tool_coalescer.is_empty() {
        let final_tools = tool_coalescer.finalize();
        deps.channel_adapter.emit_tool_status(&job.session_key, &run_id, tool_coalescer.version(), &final_tools).await;
    }

    // A single channel_adapter call stands in for "each configured fanout
    // target" — no fanout-target config table is built, since none is named
    // in the configuration surface.
    deps.channel_adapter.on_completed(&job.session_key, &run_id, ok, &answer, error.as_deref()).await;

    record.context_ratio = usage.context_ratio;
    record.resume_token = resume_token.clone();
    let answer_preview = (!answer.is_empty()).then(|| super::truncate_str(&answer, 200));
    record.finish(ok, answer_preview, error);
    let _ = deps.run_store.upsert(record.clone());

    if let Some(token) = &resume_token {
        deps.sessions.set_session_meta(&job.session_key, job.model.clone(), Some(token.engine.clone()));
    } else if job.model.is_some() {
        deps.sessions.set_session_meta(&job.session_key, job.model.clone(), Some(engine_id.clone()));
    }

    let duration_ms = record
        .finished_at
        .map(|f| (f - record.started_at).num_milliseconds().max(0) as u64)
        .unwrap_or(0);
    TraceEvent::RunCompleted { run_id: run_id.clone(), ok, duration_ms }.emit();

    deps.run_supervisor.release(&run_id);
    record
}

fn is_transient_error(err: &str) -> bool {
    let lower = err.to_ascii_lowercase();
    TRANSIENT_ERROR_MARKERS.iter().any(|m| lower.contains(m))
}

/// Run one attempt of `job` against `engine`, returning its terminal event.
async fn execute_attempt(
    deps: &Arc<RunDeps>,
    engine: &Arc<dyn EngineAdapter>,
    job: &Job,
    run_id: &str,
    stream: &mut StreamCoalescer,
    tools: &mut ToolStatusCoalescer,
    is_retry: bool,
) -> EngineEvent {
    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel::<EngineEvent>();
    let opts = StartOpts { model: job.model.clone() };

    let (engine_handle, _engine_run_id) = match engine.start_run(job.clone(), opts, ev_tx).await {
        Ok(pair) => pair,
        Err(e) => {
            return EngineEvent::Completed {
                ok: false,
                answer: String::new(),
                error: Some(e.to_string()),
                usage: Usage::default(),
                resume_token: None,
            };
        }
    };

    let cancel_token = CancellationToken::new();
    let steer_supported = engine.supports_steer();
    let (steer_tx, mut steer_rx) = mpsc::unbounded_channel::<String>();

    let active = Arc::new(ActiveRun {
        run_id: run_id.to_string(),
        session_key: job.session_key.clone(),
        engine_id: engine.id().to_string(),
        engine_handle: engine_handle.clone(),
        cancel: cancel_token.clone(),
        steer_tx: steer_supported.then_some(steer_tx),
    });
    deps.runs.register(active);
    deps.cancel_map.register(run_id, cancel_token.clone());
    if !is_retry {
        deps.channel_adapter.on_started(&job.session_key, run_id).await;
    }

    let watchdog_idle = Duration::from_secs(deps.config.watchdog.idle_limit_secs);
    let kill_timeout = Duration::from_secs(deps.config.engine.kill_timeout_secs);

    let mut last_activity = Instant::now();
    let mut cancel_requested_at: Option<Instant> = None;

    let terminal = loop {
        let now = Instant::now();
        let watchdog_deadline = last_activity + watchdog_idle;
        let mut wake_at = watchdog_deadline;
        if let Some(requested_at) = cancel_requested_at {
            wake_at = wake_at.min(requested_at + kill_timeout);
        }
        if stream.has_pending() {
            wake_at = wake_at.min(stream.idle_deadline());
        }
        let sleep_dur = wake_at.saturating_duration_since(now);

        tokio::select! {
            biased;

            ev = ev_rx.recv() => {
                match ev {
                    Some(ev) => {
                        last_activity = Instant::now();
                        if let Some(terminal) = process_event(ev, &deps.channel_adapter, &job.session_key, run_id, stream, tools).await {
                            break terminal;
                        }
                    }
                    None => {
                        break EngineEvent::Completed {
                            ok: false,
                            answer: String::new(),
                            error: Some("engine event channel closed without a terminal event".into()),
                            usage: Usage::default(),
                            resume_token: None,
                        };
                    }
                }
            }

            Some(text) = steer_rx.recv(), if steer_supported => {
                if let Err(e) = engine.steer(&engine_handle, &text).await {
                    tracing::warn!(run_id, error = %e, "steer forwarding failed");
                }
            }

            () = cancel_token.cancelled(), if cancel_requested_at.is_none() => {
                cancel_requested_at = Some(Instant::now());
                if let Err(e) = engine.cancel(&engine_handle, "cancelled").await {
                    tracing::warn!(run_id, error = %e, "engine cancel call failed");
                }
            }

            () = tokio::time::sleep(sleep_dur) => {
                let now = Instant::now();
                if cancel_requested_at.is_none() && now >= watchdog_deadline {
                    TraceEvent::WatchdogFired { run_id: run_id.to_string(), session_key: job.session_key.clone() }.emit();
                    if deps.channel_adapter.supports_interactive_confirmation() {
                        deps.channel_adapter.send_keepalive_prompt(&job.session_key, run_id).await;
                        let confirm_wait = Duration::from_secs(deps.config.watchdog.confirm_timeout_secs);
                        let reply_rx = deps.keepalive.register(run_id);
                        tokio::select! {
                            reply = reply_rx => {
                                match reply {
                                    Ok(KeepaliveReply::KeepWaiting) => {
                                        last_activity = Instant::now();
                                    }
                                    Ok(KeepaliveReply::StopRun) | Err(_) => {
                                        cancel_token.cancel();
                                    }
                                }
                            }
                            () = tokio::time::sleep(confirm_wait) => {
                                deps.keepalive.remove(run_id);
                                cancel_token.cancel();
                            }
                        }
                    } else {
                        cancel_token.cancel();
                    }
                    continue;
                }
                if let Some(requested_at) = cancel_requested_at {
                    if now >= requested_at + kill_timeout {
                        break EngineEvent::Completed {
                            ok: false,
                            answer: String::new(),
                            error: Some("cancelled".into()),
                            usage: Usage::default(),
                            resume_token: None,
                        };
                    }
                }
                if stream.has_pending() && now >= stream.idle_deadline() {
                    if let Some(text) = stream.flush() {
                        deps.channel_adapter.emit_stream_output(&job.session_key, run_id, stream.version(), &text).await;
                    }
                }
            }
        }
    };

    deps.runs.unregister(run_id);
    deps.cancel_map.remove(run_id);
    deps.keepalive.remove(run_id);
    terminal
}

/// Ingest one non-terminal event, returning `Some` only once a `Completed`
/// arrives.
async fn process_event(
    ev: EngineEvent,
    channel_adapter: &Arc<dyn ChannelAdapter>,
    session_key: &str,
    run_id: &str,
    stream: &mut StreamCoalescer,
    tools: &mut ToolStatusCoalescer,
) -> Option<EngineEvent> {
    match ev {
        EngineEvent::Started { .. } => None,
        EngineEvent::Delta { seq, text } => {
            if let IngestOutcome::Flush(rendered) = stream.ingest(seq, &text) {
                channel_adapter.emit_stream_output(session_key, run_id, stream.version(), &rendered).await;
            }
            None
        }
        EngineEvent::Action { id, kind, title, detail: _, phase, ok, message } => {
            if let Some(rendered) = tools.ingest(&id, kind, &title, phase, ok, message) {
                channel_adapter.emit_tool_status(session_key, run_id, tools.version(), &rendered).await;
            }
            None
        }
        completed @ EngineEvent::Completed { .. } => Some(completed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::channel_adapter::default_adapter;
    use orc_domain::config::Config;
    use std::collections::HashMap;

    fn job(session_key: &str) -> Job {
        Job {
            run_id: uuid::Uuid::new_v4().to_string(),
            session_key: session_key.into(),
            text: "hello".into(),
            user_message_id: "m1".into(),
            resume_token: None,
            engine_hint: Some("lemon".into()),
            model: None,
            cwd: None,
            tool_policy: Default::default(),
            queue_mode: Some(QueueMode::Collect),
            meta: HashMap::new(),
        }
    }

    async fn deps() -> (Arc<RunDeps>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(Config::default());
        let engines = Arc::new(EngineRegistry::from_config(&config.engine).unwrap());
        let sessions = Arc::new(SessionMetaStore::new(dir.path()).unwrap());
        let run_store = Arc::new(RunStore::new(dir.path()).unwrap());
        let cancel_map = Arc::new(CancelMap::new());
        let run_supervisor = Arc::new(RunSupervisor::new(Arc::clone(&cancel_map), config.run_supervisor.max_children));
        (
            Arc::new(RunDeps {
                config,
                engines,
                runs: Arc::new(RunRegistry::new()),
                run_store,
                sessions,
                channel_adapter: default_adapter(),
                cancel_map,
                run_supervisor,
                keepalive: Arc::new(KeepaliveMap::new()),
            }),
            dir,
        )
    }

    #[tokio::test]
    async fn native_engine_run_completes_ok() {
        let (deps, _dir) = deps().await;
        let record = run(deps, job("agent:bot1:main")).await;
        assert_eq!(record.ok, Some(true));
        assert_eq!(record.state, RunState::Terminated);
    }

    #[tokio::test]
    async fn unknown_engine_yields_crashed_record() {
        let (deps, _dir) = deps().await;
        let mut j = job("agent:bot1:main");
        j.engine_hint = Some("ghost".into());
        let record = run(deps, j).await;
        assert_eq!(record.ok, Some(false));
        assert_eq!(record.state, RunState::Crashed);
    }

    #[tokio::test]
    async fn run_is_unregistered_after_completion() {
        let (deps, _dir) = deps().await;
        let runs = Arc::clone(&deps.runs);
        let _record = run(deps, job("agent:bot1:main")).await;
        assert_eq!(runs.active_run_count(), 0);
    }

    #[test]
    fn is_transient_error_matches_known_markers() {
        assert!(is_transient_error("Connection reset by peer"));
        assert!(is_transient_error("request timeout"));
        assert!(!is_transient_error("invalid api key"));
    }
}

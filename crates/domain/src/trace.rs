use serde::Serialize;

/// Structured trace events emitted across the orchestration core.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionResolved {
        session_key: String,
        is_new: bool,
    },
    RunAdmitted {
        run_id: String,
        session_key: String,
        queue_mode: String,
    },
    RunStarted {
        run_id: String,
        session_key: String,
        engine: String,
    },
    RunCompleted {
        run_id: String,
        ok: bool,
        duration_ms: u64,
    },
    EngineResolved {
        session_key: String,
        engine: String,
        reason: String,
    },
    CompactionScheduled {
        session_key: String,
        reason: String,
    },
    WatchdogFired {
        run_id: String,
        session_key: String,
    },
    RetryScheduled {
        run_id: String,
        attempt: u32,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "orc_event");
    }
}

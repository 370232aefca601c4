//! The engine-adapter contract.
//!
//! An engine adapter is an external collaborator: something that actually
//! runs a [`Job`] and reports back [`EngineEvent`]s. The core tolerates only
//! bounded misbehavior from an adapter — if no terminal `Completed` arrives
//! within the configured kill timeout after a `cancel`, the run process
//! synthesizes one itself.

use std::sync::Arc;

use orc_domain::error::Result;
use orc_domain::model::{Job, ResumeToken};
use orc_domain::stream::EngineEvent;

/// Channel an adapter pushes [`EngineEvent`]s into for the duration of a run.
/// Protocol: exactly one `Started`, zero or more `Delta` (strictly
/// increasing `seq`), zero or more `Action`, exactly one terminal
/// `Completed`. A closed receiver means the run process has stopped
/// listening; adapters should treat send failures as a cue to stop.
pub type EventSink = tokio::sync::mpsc::UnboundedSender<EngineEvent>;

/// Opaque handle an adapter hands back from [`EngineAdapter::start_run`] and
/// expects in [`EngineAdapter::cancel`] / [`EngineAdapter::steer`]. Adapters
/// are free to interpret this however they like; the core never inspects it.
#[derive(Debug, Clone)]
pub struct RunHandle(pub Arc<str>);

impl RunHandle {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Per-run overrides resolved by the orchestrator before a job reaches an
/// adapter (model selection already applied; cwd already resolved).
#[derive(Debug, Clone, Default)]
pub struct StartOpts {
    pub model: Option<String>,
}

/// Trait every engine adapter must implement.
///
/// Implementations translate between the core's internal [`Job`] /
/// [`EngineEvent`] types and whatever transport the underlying engine
/// actually speaks (in-process, child process, or remote HTTP service).
#[async_trait::async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Stable identifier used in `default_engine`, engine hints, and resume
    /// tokens (e.g. `"lemon"`).
    fn id(&self) -> &str;

    /// Whether [`EngineAdapter::steer`] is meaningful for this adapter.
    /// Adapters that answer `false` cause `steer` queue-mode jobs to degrade
    /// to `followup` one level up, in the scheduler.
    fn supports_steer(&self) -> bool {
        false
    }

    /// Pull a resume token out of free-form reply text, if this adapter's
    /// format is present. Used by the orchestrator's resume-token
    /// resolution step.
    fn extract_resume(&self, text: &str) -> Option<ResumeToken>;

    /// Render a resume token into the text appended to outbound messages.
    fn format_resume(&self, token: &ResumeToken) -> String {
        token.format()
    }

    /// Start a run. Returns as soon as the adapter has accepted the job;
    /// events are delivered asynchronously through `sink` until exactly one
    /// `Completed` is sent.
    async fn start_run(
        &self,
        job: Job,
        opts: StartOpts,
        sink: EventSink,
    ) -> Result<(RunHandle, String)>;

    /// Best-effort cancellation. Must eventually cause a `Completed { ok:
    /// false }` to be pushed through the run's sink; the caller does not
    /// block on this returning before applying its own kill-timeout.
    async fn cancel(&self, handle: &RunHandle, reason: &str) -> Result<()>;

    /// Forward steering text into an active run. Only called when
    /// [`EngineAdapter::supports_steer`] returns `true`.
    async fn steer(&self, _handle: &RunHandle, _text: &str) -> Result<()> {
        Err(orc_domain::error::Error::Other(format!(
            "engine {} does not support steering",
            self.id()
        )))
    }
}

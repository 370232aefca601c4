//! Fanout target for a run's rendered output. All methods are telemetry-only
//! — a channel adapter failing to deliver a render must never affect run
//! state or be retried by the run process itself.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    async fn on_started(&self, session_key: &str, run_id: &str);

    /// A coalesced stream snapshot is ready to render. `version` is the
    /// coalescer's monotone counter — used by stateful adapters to reject
    /// stale or duplicate renders.
    async fn emit_stream_output(&self, session_key: &str, run_id: &str, version: u64, text: &str);

    async fn emit_tool_status(&self, session_key: &str, run_id: &str, version: u64, text: &str);

    async fn on_completed(&self, session_key: &str, run_id: &str, ok: bool, answer: &str, error: Option<&str>);

    /// Whether this channel can present an interactive "Keep waiting" / "Stop
    /// run" confirmation when the watchdog fires. Channels that answer
    /// `false` (the default) get an immediate cancel instead.
    fn supports_interactive_confirmation(&self) -> bool {
        false
    }

    /// Send the keepalive confirmation prompt. Only called when
    /// `supports_interactive_confirmation` returns true.
    async fn send_keepalive_prompt(&self, session_key: &str, run_id: &str) {
        let _ = (session_key, run_id);
    }

    /// Send `attachments` as one or more grouped-media replies, batched to
    /// this adapter's natural limit. Default: a single unbatched call, since
    /// plain-logging channels have no real attachment transport.
    async fn emit_attachments(&self, session_key: &str, run_id: &str, attachments: &[String]) {
        if !attachments.is_empty() {
            tracing::debug!(session_key, run_id, count = attachments.len(), "attachments");
        }
    }
}

/// Plain logging adapter — no message editing, every render is a fresh log
/// line. The simplest thing that satisfies the trait; useful for engines
/// whose channel has no natural "edit in place" concept.
pub struct GenericChannelAdapter;

#[async_trait]
impl ChannelAdapter for GenericChannelAdapter {
    async fn on_started(&self, session_key: &str, run_id: &str) {
        tracing::info!(session_key, run_id, "run started");
    }

    async fn emit_stream_output(&self, session_key: &str, run_id: &str, version: u64, text: &str) {
        tracing::debug!(session_key, run_id, version, len = text.len(), "stream output");
    }

    async fn emit_tool_status(&self, session_key: &str, run_id: &str, version: u64, text: &str) {
        tracing::debug!(session_key, run_id, version, len = text.len(), "tool status");
    }

    async fn on_completed(&self, session_key: &str, run_id: &str, ok: bool, answer: &str, error: Option<&str>) {
        tracing::info!(session_key, run_id, ok, answer_len = answer.len(), error, "run completed");
    }
}

#[derive(Default, Clone)]
struct EditState {
    last_progress_version: u64,
    last_answer_version: u64,
}

/// Batch size for grouped-media replies.
const MAX_ATTACHMENTS_PER_BATCH: usize = 10;
/// How many recent tool-status action lines stay visible; older ones
/// collapse into a single summary line.
const MAX_RECENT_ACTIONS: usize = 5;

/// Adapter for channels that support editing a previously-sent message
/// in-place (e.g. a chat platform message id). Tracks per-session edit state
/// so a stale or duplicate render (arriving out of order, or after a newer
/// one already landed) is a no-op rather than clobbering a fresher render.
///
/// The progress message carries a cancel button widget for the lifetime of
/// the run; clicking it is expected to reach the API's abort surface.
pub struct EditInPlaceChannelAdapter {
    state: Mutex<HashMap<String, EditState>>,
}

impl EditInPlaceChannelAdapter {
    pub fn new() -> Self {
        Self { state: Mutex::new(HashMap::new()) }
    }
}

impl Default for EditInPlaceChannelAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep only the last `cap` tool-status action lines, collapsing any older
/// ones dropped into a single `... N earlier` summary line.
fn cap_recent_actions(text: &str, cap: usize) -> String {
    let Some(rest) = text.strip_prefix("Tool calls:\n") else {
        return text.to_string();
    };
    let actions: Vec<&str> = rest.lines().collect();
    if actions.len() <= cap {
        return text.to_string();
    }
    let dropped = actions.len() - cap;
    let mut out = String::from("Tool calls:\n");
    out.push_str(&format!("... {dropped} earlier\n"));
    for line in &actions[dropped..] {
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[async_trait]
impl ChannelAdapter for EditInPlaceChannelAdapter {
    async fn on_started(&self, session_key: &str, run_id: &str) {
        self.state.lock().entry(session_key.to_string()).or_default();
        tracing::info!(session_key, run_id, "run started, progress message pending (cancel button attached)");
    }

    async fn emit_stream_output(&self, session_key: &str, run_id: &str, version: u64, text: &str) {
        let mut guard = self.state.lock();
        let entry = guard.entry(session_key.to_string()).or_default();
        if version <= entry.last_progress_version && entry.last_progress_version != 0 {
            tracing::trace!(session_key, run_id, version, "stale stream render, skipping edit");
            return;
        }
        let action = if entry.last_progress_version == 0 { "create" } else { "edit" };
        entry.last_progress_version = version;
        tracing::debug!(session_key, run_id, version, action, len = text.len(), "progress message");
    }

    async fn emit_tool_status(&self, session_key: &str, run_id: &str, version: u64, text: &str) {
        let capped = cap_recent_actions(text, MAX_RECENT_ACTIONS);
        tracing::debug!(session_key, run_id, version, len = capped.len(), "tool status message");
    }

    async fn on_completed(&self, session_key: &str, run_id: &str, ok: bool, answer: &str, error: Option<&str>) {
        let mut guard = self.state.lock();
        let entry = guard.entry(session_key.to_string()).or_default();
        let action = if entry.last_answer_version == 0 { "create" } else { "edit" };
        entry.last_answer_version += 1;
        guard.remove(session_key);
        tracing::info!(session_key, run_id, ok, action, answer_len = answer.len(), error, "final answer message");
    }

    fn supports_interactive_confirmation(&self) -> bool {
        true
    }

    async fn send_keepalive_prompt(&self, session_key: &str, run_id: &str) {
        tracing::info!(session_key, run_id, "watchdog idle: keepalive prompt sent (Keep waiting / Stop run)");
    }

    async fn emit_attachments(&self, session_key: &str, run_id: &str, attachments: &[String]) {
        for (i, batch) in attachments.chunks(MAX_ATTACHMENTS_PER_BATCH).enumerate() {
            tracing::debug!(session_key, run_id, batch = i, count = batch.len(), "attachment batch");
        }
    }
}

pub fn default_adapter() -> Arc<dyn ChannelAdapter> {
    Arc::new(GenericChannelAdapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn edit_in_place_rejects_stale_progress_version() {
        let adapter = EditInPlaceChannelAdapter::new();
        adapter.on_started("s1", "r1").await;
        adapter.emit_stream_output("s1", "r1", 3, "v3 text").await;
        adapter.emit_stream_output("s1", "r1", 2, "stale v2").await;
        let last = adapter.state.lock().get("s1").unwrap().last_progress_version;
        assert_eq!(last, 3);
    }

    #[tokio::test]
    async fn on_completed_clears_session_state() {
        let adapter = EditInPlaceChannelAdapter::new();
        adapter.on_started("s1", "r1").await;
        adapter.on_completed("s1", "r1", true, "done", None).await;
        assert!(adapter.state.lock().get("s1").is_none());
    }

    #[test]
    fn edit_in_place_supports_interactive_confirmation() {
        assert!(EditInPlaceChannelAdapter::new().supports_interactive_confirmation());
        assert!(!GenericChannelAdapter.supports_interactive_confirmation());
    }

    #[test]
    fn cap_recent_actions_leaves_short_logs_untouched() {
        let text = "Tool calls:\ntool(search) [ok]\n";
        assert_eq!(cap_recent_actions(text, 5), text);
    }

    #[test]
    fn cap_recent_actions_collapses_older_lines() {
        let mut text = String::from("Tool calls:\n");
        for i in 0..8 {
            text.push_str(&format!("tool(t{i}) [ok]\n"));
        }
        let capped = cap_recent_actions(&text, 5);
        assert!(capped.starts_with("Tool calls:\n... 3 earlier\n"));
        assert!(capped.contains("tool(t7) [ok]"));
        assert!(!capped.contains("tool(t2) [ok]"));
    }

    #[tokio::test]
    async fn attachments_batch_at_ten() {
        let adapter = EditInPlaceChannelAdapter::new();
        let attachments: Vec<String> = (0..25).map(|i| format!("file{i}.png")).collect();
        // No direct observable here beyond not panicking; batching math is
        // exercised via the chunk count assumption below.
        adapter.emit_attachments("s1", "r1", &attachments).await;
        assert_eq!(attachments.chunks(MAX_ATTACHMENTS_PER_BATCH).count(), 3);
    }
}

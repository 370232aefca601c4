//! Coalesces an engine's `Action` events into a single rendered "Tool
//! calls:" status block, running actions first in insertion order then
//! completed actions by update time (see [`orc_domain::model::ActionLog`]).
//! Each line renders as `<kind>(<title>) [running|ok|err] <short msg?>`.

use orc_domain::config::tool_status::ToolStatusConfig;
use orc_domain::model::ActionLog;
use orc_domain::stream::{ActionKind, ActionPhase};

pub struct ToolStatusCoalescer {
    log: ActionLog,
    msg_truncate: usize,
    version: u64,
    finalized: bool,
}

impl ToolStatusCoalescer {
    pub fn new(config: ToolStatusConfig) -> Self {
        Self { log: ActionLog::new(config.max_actions), msg_truncate: config.msg_truncate, version: 0, finalized: false }
    }

    /// Ingest an action update. `ActionLog::upsert` applies its own (larger)
    /// truncation constant internally; truncating to `msg_truncate` here
    /// first means the configured value is the one that actually governs
    /// rendered message length.
    pub fn ingest(
        &mut self,
        id: &str,
        kind: ActionKind,
        title: &str,
        phase: ActionPhase,
        ok: Option<bool>,
        message: Option<String>,
    ) -> Option<String> {
        if self.finalized {
            return None;
        }
        let truncated = message.map(|m| truncate_chars(&m, self.msg_truncate));
        self.log.upsert(id, kind, title, phase, ok, truncated);
        self.version += 1;
        Some(self.render())
    }

    pub fn render(&self) -> String {
        if self.log.is_empty() {
            return String::new();
        }
        let mut out = String::from("Tool calls:\n");
        for rec in self.log.render_order() {
            let marker = match rec.phase {
                ActionPhase::Started => "running",
                ActionPhase::Updated => "running",
                ActionPhase::Completed => match rec.ok {
                    Some(true) => "ok",
                    Some(false) => "err",
                    None => "ok",
                },
            };
            let kind = kind_str(rec.kind);
            match &rec.message {
                Some(msg) => out.push_str(&format!("{kind}({}) [{marker}] {msg}\n", rec.title)),
                None => out.push_str(&format!("{kind}({}) [{marker}]\n", rec.title)),
            }
        }
        out
    }

    pub fn finalize(&mut self) -> String {
        self.finalized = true;
        self.version += 1;
        self.render()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }
}

fn kind_str(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Tool => "tool",
        ActionKind::Command => "command",
        ActionKind::FileChange => "file-change",
        ActionKind::WebSearch => "web-search",
        ActionKind::Subagent => "subagent",
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ToolStatusConfig {
        ToolStatusConfig { max_actions: 40, msg_truncate: 10 }
    }

    #[test]
    fn renders_running_before_completed() {
        let mut c = ToolStatusCoalescer::new(cfg());
        c.ingest("a", ActionKind::Tool, "search", ActionPhase::Completed, Some(true), None);
        c.ingest("b", ActionKind::Tool, "fetch", ActionPhase::Started, None, None);
        let rendered = c.render();
        let fetch_pos = rendered.find("fetch").unwrap();
        let search_pos = rendered.find("search").unwrap();
        assert!(fetch_pos < search_pos);
    }

    #[test]
    fn truncates_message_to_configured_length() {
        let mut c = ToolStatusCoalescer::new(cfg());
        c.ingest("a", ActionKind::Tool, "t", ActionPhase::Completed, Some(true), Some("a very long status message".into()));
        let rendered = c.render();
        assert!(rendered.contains('…'));
    }

    #[test]
    fn finalize_stops_further_ingestion() {
        let mut c = ToolStatusCoalescer::new(cfg());
        c.ingest("a", ActionKind::Tool, "t", ActionPhase::Started, None, None);
        c.finalize();
        assert!(c.ingest("b", ActionKind::Tool, "u", ActionPhase::Started, None, None).is_none());
    }

    #[test]
    fn empty_log_renders_empty_string() {
        let c = ToolStatusCoalescer::new(cfg());
        assert_eq!(c.render(), "");
        assert!(c.is_empty());
    }
}

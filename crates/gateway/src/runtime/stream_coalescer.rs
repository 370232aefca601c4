//! Coalesces an engine's `Delta` stream into rendered snapshots at a bounded
//! rate, so a channel adapter edits its progress message a handful of times
//! per run rather than once per token.
//!
//! Flush rule: flush immediately once pending growth reaches `min_chars` or
//! `max_latency_ms` has elapsed since the last flush; otherwise report
//! `Scheduled` so the run process arms an idle-flush deadline at `idle_ms`.

use std::time::Duration;

use orc_domain::config::stream_coalescer::StreamCoalescerConfig;
use orc_domain::model::StreamBuffer;

pub enum IngestOutcome {
    /// Flush now; contains the full rendered text as of this delta.
    Flush(String),
    /// Buffered; the caller should arm (or leave armed) an idle-flush timer.
    Scheduled,
    /// Delta rejected — already finalized, or `seq` is not newer than the
    /// last accepted one.
    Rejected,
}

pub struct StreamCoalescer {
    buf: StreamBuffer,
    config: StreamCoalescerConfig,
    last_flush_at: std::time::Instant,
}

impl StreamCoalescer {
    pub fn new(config: StreamCoalescerConfig) -> Self {
        Self { buf: StreamBuffer::new(), config, last_flush_at: std::time::Instant::now() }
    }

    pub fn ingest(&mut self, seq: u64, text: &str) -> IngestOutcome {
        if self.buf.finalized {
            return IngestOutcome::Rejected;
        }
        if seq <= self.buf.last_accepted_seq && self.buf.last_accepted_seq != 0 {
            return IngestOutcome::Rejected;
        }

        self.buf.last_accepted_seq = seq;
        self.buf.full_text.push_str(text);
        self.buf.pending.push_str(text);
        if self.buf.full_text.chars().count() > self.config.max_full_text {
            self.buf.full_text = middle_truncate(&self.buf.full_text, self.config.max_full_text);
        }

        let elapsed = self.last_flush_at.elapsed();
        if self.buf.pending.chars().count() >= self.config.min_chars
            || elapsed >= Duration::from_millis(self.config.max_latency_ms)
        {
            self.flush();
            IngestOutcome::Flush(self.buf.full_text.clone())
        } else {
            IngestOutcome::Scheduled
        }
    }

    /// Idle-flush deadline relative to the last flush, for the run process's
    /// select! loop to compute a sleep duration against.
    pub fn idle_deadline(&self) -> std::time::Instant {
        self.last_flush_at + Duration::from_millis(self.config.idle_ms)
    }

    pub fn has_pending(&self) -> bool {
        !self.buf.pending.is_empty()
    }

    /// Force a flush (used for the idle timer and for finalize). Returns the
    /// full rendered text if there was anything pending.
    pub fn flush(&mut self) -> Option<String> {
        if self.buf.pending.is_empty() {
            return None;
        }
        self.buf.pending.clear();
        self.buf.version += 1;
        self.last_flush_at = std::time::Instant::now();
        Some(self.buf.full_text.clone())
    }

    /// Mark the stream closed and return the final rendered text.
    pub fn finalize(&mut self) -> String {
        self.buf.finalized = true;
        self.buf.pending.clear();
        self.buf.version += 1;
        self.buf.full_text.clone()
    }

    pub fn version(&self) -> u64 {
        self.buf.version
    }
}

fn middle_truncate(s: &str, max_chars: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_chars {
        return s.to_string();
    }
    let marker = "\n...[truncated]...\n";
    let marker_chars = marker.chars().count();
    let keep = max_chars.saturating_sub(marker_chars);
    let head = keep / 2;
    let tail = keep - head;
    let head_s: String = chars[..head].iter().collect();
    let tail_s: String = chars[chars.len() - tail..].iter().collect();
    format!("{head_s}{marker}{tail_s}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> StreamCoalescerConfig {
        StreamCoalescerConfig { min_chars: 10, idle_ms: 400, max_latency_ms: 100_000, max_full_text: 1000 }
    }

    #[test]
    fn flushes_once_min_chars_reached() {
        let mut c = StreamCoalescer::new(cfg());
        assert!(matches!(c.ingest(1, "short"), IngestOutcome::Scheduled));
        match c.ingest(2, " enough now") {
            IngestOutcome::Flush(text) => assert_eq!(text, "short enough now"),
            _ => panic!("expected flush"),
        }
    }

    #[test]
    fn rejects_out_of_order_seq() {
        let mut c = StreamCoalescer::new(cfg());
        c.ingest(5, "hello");
        assert!(matches!(c.ingest(3, "late"), IngestOutcome::Rejected));
    }

    #[test]
    fn rejects_after_finalize() {
        let mut c = StreamCoalescer::new(cfg());
        c.ingest(1, "hi");
        c.finalize();
        assert!(matches!(c.ingest(2, "more"), IngestOutcome::Rejected));
    }

    #[test]
    fn max_full_text_middle_truncates() {
        let mut small = cfg();
        small.max_full_text = 20;
        small.min_chars = 1000; // never auto-flush on size
        let mut c = StreamCoalescer::new(small);
        c.ingest(1, &"x".repeat(50));
        assert!(c.buf.full_text.chars().count() <= 20);
        assert!(c.buf.full_text.contains("truncated"));
    }

    #[test]
    fn finalize_returns_full_text_and_blocks_further_ingest() {
        let mut c = StreamCoalescer::new(cfg());
        c.ingest(1, "hello world");
        let final_text = c.finalize();
        assert!(final_text.contains("hello world"));
    }
}

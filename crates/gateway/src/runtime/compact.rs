//! Compaction scheduling — usage-ratio and error-driven marker model.
//!
//! The run process never compacts a session itself; it only decides whether
//! *this* run's completion should leave a `pending_compaction` marker
//! (step 2 of the completion pipeline). The intake router consults the
//! marker on the session's next inbound message and, if still valid,
//! synthesizes a compaction-prompt job instead of a normal one. This
//! lazy/pull handoff avoids a dependency cycle between the run process and
//! the scheduler that would otherwise be needed to push a background
//! compaction turn immediately.

use orc_domain::config::compaction::CompactionConfig;

/// Substrings in an engine's error text that indicate the engine itself hit
/// a context-window overflow, distinct from any other failure.
const OVERFLOW_MARKERS: &[&str] = &["context length", "context window", "too many tokens", "context_length_exceeded"];

/// Whether this run's completion should schedule compaction for its session:
/// either usage crossed the preemptive ratio, or the engine reported an
/// overflow outright.
pub fn should_schedule(context_ratio: Option<f64>, error: Option<&str>, config: &CompactionConfig) -> bool {
    if let Some(ratio) = context_ratio {
        if ratio >= config.preemptive_ratio {
            return true;
        }
    }
    if let Some(err) = error {
        return is_overflow_error(err);
    }
    false
}

fn is_overflow_error(err: &str) -> bool {
    let lower = err.to_ascii_lowercase();
    OVERFLOW_MARKERS.iter().any(|m| lower.contains(m))
}

/// Text the router substitutes for the user's message when it consumes a
/// still-valid pending-compaction marker instead of the session's real next
/// message. The engine is expected to fold this into a summarization turn
/// before continuing with the user's actual request.
pub fn compaction_prompt_prefix() -> &'static str {
    "[context nearing capacity — summarize the conversation so far before continuing]\n\n"
}

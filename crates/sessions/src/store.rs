//! Persisted session-adjacent state.
//!
//! Three independent key-value namespaces, opaque to the orchestration
//! core beyond their documented shape (see the external-interfaces
//! "persisted state layout"): `session_meta`, `pending_compaction`, and
//! `endpoint_alias`. All reads tolerate missing keys — callers get `None`
//! rather than an error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use orc_domain::error::{Error, Result};

/// `session_meta:<session_key>` — last resolved model/engine for a session,
/// consulted by the orchestrator's model/engine resolution precedence chains.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionMeta {
    pub last_model: Option<String>,
    pub last_engine: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// `pending_compaction:<session_key>` — marker written by the run process's
/// completion pipeline when usage crosses the preemptive ratio; consulted by
/// the intake router on the next inbound message for that session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCompaction {
    pub created_at: DateTime<Utc>,
}

impl PendingCompaction {
    pub fn is_expired(&self, ttl_secs: u64) -> bool {
        let age = Utc::now().signed_duration_since(self.created_at);
        age.num_seconds() >= ttl_secs as i64
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    session_meta: HashMap<String, SessionMeta>,
    #[serde(default)]
    pending_compaction: HashMap<String, PendingCompaction>,
    #[serde(default)]
    endpoint_alias: HashMap<String, String>,
}

/// JSON-file-backed store for the three persisted-state namespaces.
pub struct SessionMetaStore {
    path: PathBuf,
    data: RwLock<Snapshot>,
}

impl SessionMetaStore {
    /// Load or create the store at `state_path/sessions/session_meta.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("sessions");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let path = dir.join("session_meta.json");
        let data = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            Snapshot::default()
        };

        Ok(Self { path, data: RwLock::new(data) })
    }

    // ── session_meta ──────────────────────────────────────────────

    pub fn get_session_meta(&self, session_key: &str) -> Option<SessionMeta> {
        self.data.read().session_meta.get(session_key).cloned()
    }

    pub fn set_session_meta(&self, session_key: &str, model: Option<String>, engine: Option<String>) {
        let mut data = self.data.write();
        let entry = data.session_meta.entry(session_key.to_string()).or_default();
        if model.is_some() {
            entry.last_model = model;
        }
        if engine.is_some() {
            entry.last_engine = engine;
        }
        entry.last_activity_at = Some(Utc::now());
    }

    /// All known sessions with their last-resolved meta, for `GET
    /// /v1/sessions`. Order is unspecified.
    pub fn list_session_meta(&self) -> Vec<(String, SessionMeta)> {
        self.data.read().session_meta.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    // ── pending_compaction ────────────────────────────────────────

    pub fn get_pending_compaction(&self, session_key: &str) -> Option<PendingCompaction> {
        self.data.read().pending_compaction.get(session_key).cloned()
    }

    pub fn set_pending_compaction(&self, session_key: &str) {
        self.data
            .write()
            .pending_compaction
            .insert(session_key.to_string(), PendingCompaction { created_at: Utc::now() });
    }

    pub fn clear_pending_compaction(&self, session_key: &str) {
        self.data.write().pending_compaction.remove(session_key);
    }

    // ── endpoint_alias ────────────────────────────────────────────

    pub fn get_endpoint_alias(&self, name: &str) -> Option<String> {
        self.data.read().endpoint_alias.get(name).cloned()
    }

    pub fn set_endpoint_alias(&self, name: &str, route: &str) {
        self.data.write().endpoint_alias.insert(name.to_string(), route.to_string());
    }

    /// Persist the current state to disk.
    pub fn flush(&self) -> Result<()> {
        let data = self.data.read();
        let json = serde_json::to_string_pretty(&*data)
            .map_err(|e| Error::Other(format!("serializing session_meta store: {e}")))?;
        std::fs::write(&self.path, json).map_err(Error::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_keys_tolerate_as_none() {
        let dir = tempdir().unwrap();
        let store = SessionMetaStore::new(dir.path()).unwrap();
        assert!(store.get_session_meta("agent:bot1:main").is_none());
        assert!(store.get_pending_compaction("agent:bot1:main").is_none());
        assert!(store.get_endpoint_alias("alias1").is_none());
    }

    #[test]
    fn session_meta_roundtrip_and_flush() {
        let dir = tempdir().unwrap();
        let store = SessionMetaStore::new(dir.path()).unwrap();
        store.set_session_meta("agent:bot1:main", Some("gpt-4o".into()), Some("lemon".into()));
        let meta = store.get_session_meta("agent:bot1:main").unwrap();
        assert_eq!(meta.last_model.as_deref(), Some("gpt-4o"));
        store.flush().unwrap();

        let reloaded = SessionMetaStore::new(dir.path()).unwrap();
        let meta = reloaded.get_session_meta("agent:bot1:main").unwrap();
        assert_eq!(meta.last_engine.as_deref(), Some("lemon"));
    }

    #[test]
    fn list_session_meta_returns_all_known_sessions() {
        let dir = tempdir().unwrap();
        let store = SessionMetaStore::new(dir.path()).unwrap();
        store.set_session_meta("agent:bot1:main", Some("gpt-4o".into()), None);
        store.set_session_meta("agent:bot2:main", None, Some("lemon".into()));
        let mut sessions = store.list_session_meta();
        sessions.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].0, "agent:bot1:main");
        assert_eq!(sessions[1].0, "agent:bot2:main");
    }

    #[test]
    fn pending_compaction_set_and_clear() {
        let dir = tempdir().unwrap();
        let store = SessionMetaStore::new(dir.path()).unwrap();
        store.set_pending_compaction("agent:bot1:main");
        assert!(store.get_pending_compaction("agent:bot1:main").is_some());
        store.clear_pending_compaction("agent:bot1:main");
        assert!(store.get_pending_compaction("agent:bot1:main").is_none());
    }

    #[test]
    fn pending_compaction_expiry() {
        let marker = PendingCompaction { created_at: Utc::now() - chrono::Duration::hours(13) };
        assert!(marker.is_expired(12 * 3600));
        let fresh = PendingCompaction { created_at: Utc::now() };
        assert!(!fresh.is_expired(12 * 3600));
    }

    #[test]
    fn endpoint_alias_roundtrip() {
        let dir = tempdir().unwrap();
        let store = SessionMetaStore::new(dir.path()).unwrap();
        store.set_endpoint_alias("support", "agent:support-bot:main");
        assert_eq!(store.get_endpoint_alias("support").as_deref(), Some("agent:support-bot:main"));
    }
}

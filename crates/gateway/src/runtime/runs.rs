//! Bounded in-memory ring of [`RunRecord`]s plus append-only JSONL
//! persistence, so a restart can still answer `GET /v1/runs/:run_id` for
//! runs started before the crash.
//!
//! Each call to [`RunStore::upsert`] appends one JSONL line; on load, lines
//! are replayed in order and a later line for the same `run_id` simply
//! overwrites the earlier one in memory — the log itself is never rewritten
//! in place.

use std::collections::{HashMap, VecDeque};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use chrono::{DateTime, Utc};

use orc_domain::error::{Error, Result};
use orc_domain::model::RunRecord;

pub const MAX_RUNS_IN_MEMORY: usize = 2000;

struct Inner {
    records: VecDeque<RunRecord>,
    index: HashMap<String, usize>,
    base_seq: usize,
}

impl Inner {
    fn deque_idx(&self, seq: usize) -> Option<usize> {
        seq.checked_sub(self.base_seq)
    }

    fn insert_or_replace(&mut self, record: RunRecord) {
        if let Some(&seq) = self.index.get(&record.run_id) {
            if let Some(idx) = self.deque_idx(seq) {
                if let Some(slot) = self.records.get_mut(idx) {
                    *slot = record;
                    return;
                }
            }
        }

        let seq = self.base_seq + self.records.len();
        self.index.insert(record.run_id.clone(), seq);
        self.records.push_back(record);

        while self.records.len() > MAX_RUNS_IN_MEMORY {
            if let Some(evicted) = self.records.pop_front() {
                self.index.remove(&evicted.run_id);
            }
            self.base_seq += 1;
        }
    }

    fn get(&self, run_id: &str) -> Option<RunRecord> {
        let seq = *self.index.get(run_id)?;
        let idx = self.deque_idx(seq)?;
        self.records.get(idx).cloned()
    }
}

pub struct RunStore {
    inner: RwLock<Inner>,
    log_path: PathBuf,
}

impl RunStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let log_path = state_path.join("runs.jsonl");

        let mut inner = Inner { records: VecDeque::new(), index: HashMap::new(), base_seq: 0 };
        if log_path.exists() {
            let raw = std::fs::read_to_string(&log_path).map_err(Error::Io)?;
            for line in raw.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                if let Ok(record) = serde_json::from_str::<RunRecord>(line) {
                    inner.insert_or_replace(record);
                }
            }
        }

        Ok(Self { inner: RwLock::new(inner), log_path })
    }

    /// Insert a new run or replace an existing run with the same id, and
    /// append the new state to the JSONL log.
    pub fn upsert(&self, record: RunRecord) -> Result<()> {
        self.append_log(&record)?;
        self.inner.write().insert_or_replace(record);
        Ok(())
    }

    pub fn get(&self, run_id: &str) -> Option<RunRecord> {
        self.inner.read().get(run_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count runs that finished at or after `since` — used by `/healthz`'s
    /// `completed_today` count, which resets at midnight UTC.
    pub fn completed_since(&self, since: DateTime<Utc>) -> usize {
        self.inner.read().records.iter().filter(|r| r.finished_at.map(|f| f >= since).unwrap_or(false)).count()
    }

    fn append_log(&self, record: &RunRecord) -> Result<()> {
        let line = serde_json::to_string(record).map_err(Error::Json)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.log_path).map_err(Error::Io)?;
        writeln!(file, "{line}").map_err(Error::Io)?;
        Ok(())
    }
}

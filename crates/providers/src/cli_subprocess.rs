//! Engine adapter that runs an external CLI as a child process.
//!
//! The job is written as a single JSON line to the child's stdin; the child
//! is expected to write one `EngineEvent` JSON object per line to stdout,
//! ending with exactly one `Completed`. Cancellation kills the child
//! process; if it doesn't exit promptly the run process's own kill-timeout
//! takes over and synthesizes a failed completion regardless.

use std::collections::HashMap;
use std::process::Stdio;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use uuid::Uuid;

use orc_domain::config::engine::EngineDef;
use orc_domain::error::{Error, Result};
use orc_domain::model::{Job, ResumeToken};
use orc_domain::stream::{EngineEvent, Usage};

use crate::traits::{EngineAdapter, EventSink, RunHandle, StartOpts};

pub struct CliSubprocessEngine {
    id: String,
    command: String,
    args: Vec<String>,
    children: Mutex<HashMap<String, Child>>,
}

impl CliSubprocessEngine {
    pub fn from_def(def: &EngineDef) -> Result<Self> {
        let command = def.command.clone().ok_or_else(|| {
            Error::Config(format!("engine '{}': CliSubprocess requires 'command'", def.id))
        })?;
        Ok(Self {
            id: def.id.clone(),
            command,
            args: def.args.clone(),
            children: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait::async_trait]
impl EngineAdapter for CliSubprocessEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn extract_resume(&self, text: &str) -> Option<ResumeToken> {
        ResumeToken::parse(text.trim()).filter(|t| t.engine == self.id)
    }

    async fn start_run(
        &self,
        job: Job,
        _opts: StartOpts,
        sink: EventSink,
    ) -> Result<(RunHandle, String)> {
        let run_id = Uuid::new_v4().to_string();

        let mut child = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Engine { engine: self.id.clone(), message: format!("spawn failed: {e}") })?;

        let mut stdin = child.stdin.take().ok_or_else(|| Error::Engine {
            engine: self.id.clone(),
            message: "child stdin unavailable".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| Error::Engine {
            engine: self.id.clone(),
            message: "child stdout unavailable".into(),
        })?;

        let line = serde_json::to_string(&job).map_err(Error::Json)?;
        stdin.write_all(line.as_bytes()).await.map_err(Error::Io)?;
        stdin.write_all(b"\n").await.map_err(Error::Io)?;
        drop(stdin);

        self.children.lock().insert(run_id.clone(), child);

        let engine_id = self.id.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            loop {
                match reader.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<EngineEvent>(&line) {
                            Ok(ev) => {
                                let is_completed = ev.is_completed();
                                if sink.send(ev).is_err() {
                                    return;
                                }
                                if is_completed {
                                    return;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(engine = %engine_id, error = %e, "malformed engine event line, skipping");
                            }
                        }
                    }
                    Ok(None) => {
                        // Child closed stdout without a terminal Completed.
                        let _ = sink.send(EngineEvent::Completed {
                            ok: false,
                            answer: String::new(),
                            error: Some("engine process exited without completing".into()),
                            usage: Usage::default(),
                            resume_token: None,
                        });
                        return;
                    }
                    Err(e) => {
                        let _ = sink.send(EngineEvent::Completed {
                            ok: false,
                            answer: String::new(),
                            error: Some(format!("stdout read error: {e}")),
                            usage: Usage::default(),
                            resume_token: None,
                        });
                        return;
                    }
                }
            }
        });

        Ok((RunHandle::new(run_id.clone()), run_id))
    }

    async fn cancel(&self, handle: &RunHandle, _reason: &str) -> Result<()> {
        if let Some(mut child) = self.children.lock().remove(handle.as_str()) {
            let _ = child.start_kill();
        }
        Ok(())
    }
}

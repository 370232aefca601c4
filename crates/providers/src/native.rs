//! The native, in-process engine adapter — the default `"lemon"` engine.
//!
//! No network dependency, no child process. It deterministically transforms
//! the job text into a handful of delta chunks followed by a final answer,
//! which is enough to exercise the full run-process / coalescer pipeline
//! without any external collaborator. Real deployments register one or more
//! `CliSubprocess` / `RemoteApi` engines alongside it; `lemon` stays
//! available as a dependency-free fallback.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use orc_domain::error::Result;
use orc_domain::model::{Job, ResumeToken};
use orc_domain::stream::{EngineEvent, Usage};

use crate::traits::{EngineAdapter, EventSink, RunHandle, StartOpts};

const CHUNK_CHARS: usize = 40;

pub struct NativeEngine {
    id: String,
    running: Mutex<HashMap<String, CancellationToken>>,
}

impl NativeEngine {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), running: Mutex::new(HashMap::new()) }
    }
}

#[async_trait::async_trait]
impl EngineAdapter for NativeEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn extract_resume(&self, text: &str) -> Option<ResumeToken> {
        ResumeToken::parse(text.trim())
    }

    async fn start_run(
        &self,
        job: Job,
        _opts: StartOpts,
        sink: EventSink,
    ) -> Result<(RunHandle, String)> {
        let run_id = Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        self.running.lock().insert(run_id.clone(), token.clone());

        let engine_id = self.id.clone();
        let run_id_task = run_id.clone();
        tokio::spawn(async move {
            let resume_token = ResumeToken { engine: engine_id.clone(), value: run_id_task.clone() };
            let _ = sink.send(EngineEvent::Started {
                engine: engine_id.clone(),
                resume_token: Some(resume_token.clone()),
                title: None,
                meta: serde_json::Value::Null,
            });

            let answer = format!("lemon received: {}", job.text);
            let chars: Vec<char> = answer.chars().collect();
            let mut seq = 0u64;
            let mut cancelled = false;

            for chunk in chars.chunks(CHUNK_CHARS) {
                if token.is_cancelled() {
                    cancelled = true;
                    break;
                }
                seq += 1;
                let text: String = chunk.iter().collect();
                if sink.send(EngineEvent::Delta { seq, text }).is_err() {
                    cancelled = true;
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }

            let completed = if cancelled {
                EngineEvent::Completed {
                    ok: false,
                    answer: String::new(),
                    error: Some("cancelled".into()),
                    usage: Usage::default(),
                    resume_token: Some(resume_token),
                }
            } else {
                EngineEvent::Completed {
                    ok: true,
                    answer: answer.clone(),
                    error: None,
                    usage: Usage {
                        prompt_tokens: (job.text.chars().count() / 4) as u32,
                        completion_tokens: (answer.chars().count() / 4) as u32,
                        total_tokens: ((job.text.chars().count() + answer.chars().count()) / 4) as u32,
                        context_ratio: None,
                    },
                    resume_token: Some(resume_token),
                }
            };
            let _ = sink.send(completed);
        });

        Ok((RunHandle::new(run_id.clone()), run_id))
    }

    async fn cancel(&self, handle: &RunHandle, _reason: &str) -> Result<()> {
        if let Some(token) = self.running.lock().remove(handle.as_str()) {
            token.cancel();
        }
        Ok(())
    }
}

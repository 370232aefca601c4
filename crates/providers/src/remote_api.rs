//! Engine adapter that calls a remote HTTP engine service over SSE.
//!
//! POSTs the [`Job`] to the configured base URL and expects an SSE response
//! body of `EngineEvent` JSON payloads (see [`crate::sse`]). There is no
//! wire-level cancel call here — `cancel` is a local no-op and the run
//! process's kill-timeout synthesizes the failed completion, same as it
//! would for any adapter that goes silent.

use reqwest::Client;
use uuid::Uuid;

use orc_domain::config::engine::{AuthConfig, AuthMode, EngineDef};
use orc_domain::error::{Error, Result};
use orc_domain::model::{Job, ResumeToken};
use orc_domain::stream::EngineEvent;

use crate::sse::sse_response_stream;
use crate::traits::{EngineAdapter, EventSink, RunHandle, StartOpts};
use crate::util::resolve_api_key;
use futures_util::StreamExt;

pub struct RemoteApiEngine {
    id: String,
    base_url: String,
    auth: AuthConfig,
    client: Client,
}

impl RemoteApiEngine {
    pub fn from_def(def: &EngineDef) -> Result<Self> {
        let base_url = def.base_url.clone().ok_or_else(|| {
            Error::Config(format!("engine '{}': RemoteApi requires 'base_url'", def.id))
        })?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "engine '{}': base_url '{}' must start with http:// or https://",
                def.id, base_url
            )));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("engine '{}': building http client: {e}", def.id)))?;
        Ok(Self {
            id: def.id.clone(),
            base_url,
            auth: def.auth.clone().unwrap_or_default(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl EngineAdapter for RemoteApiEngine {
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
        let mut request = self.client.post(&self.base_url).json(&job);

        match self.auth.mode {
            AuthMode::None => {}
            AuthMode::Bearer => {
                let key = resolve_api_key(&self.auth)?;
                request = request.bearer_auth(key);
            }
            AuthMode::ApiKey => {
                let key = resolve_api_key(&self.auth)?;
                request = request.header("x-api-key", key);
            }
            AuthMode::QueryParam => {
                let key = resolve_api_key(&self.auth)?;
                request = request.query(&[("api_key", key)]);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Engine { engine: self.id.clone(), message: e.to_string() })?;

        if !response.status().is_success() {
            return Err(Error::Engine {
                engine: self.id.clone(),
                message: format!("remote engine returned HTTP {}", response.status()),
            });
        }

        let engine_id = self.id.clone();
        tokio::spawn(async move {
            let mut stream = sse_response_stream(engine_id.clone(), response);
            while let Some(item) = stream.next().await {
                match item {
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
                        let _ = sink.send(EngineEvent::Completed {
                            ok: false,
                            answer: String::new(),
                            error: Some(e.to_string()),
                            usage: Default::default(),
                            resume_token: None,
                        });
                        return;
                    }
                }
            }
        });

        Ok((RunHandle::new(run_id.clone()), run_id))
    }

    async fn cancel(&self, _handle: &RunHandle, _reason: &str) -> Result<()> {
        Ok(())
    }
}

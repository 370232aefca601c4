use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine registry configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Top-level engine-adapter configuration: which engine is used absent any
/// more specific selection, the bounded wait for a cancelled engine to
/// confirm termination, and the table of configured engine instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "d_default_engine")]
    pub default_engine: String,
    #[serde(default = "d_kill_timeout_secs")]
    pub kill_timeout_secs: u64,
    #[serde(default)]
    pub engines: Vec<EngineDef>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_engine: d_default_engine(),
            kill_timeout_secs: d_kill_timeout_secs(),
            engines: Vec::new(),
        }
    }
}

fn d_default_engine() -> String {
    "lemon".into()
}
fn d_kill_timeout_secs() -> u64 {
    2
}

/// Which reference adapter an [`EngineDef`] is instantiated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// In-process, no network dependency. The default engine (`"lemon"`).
    Native,
    /// Spawns a child process and speaks newline-delimited JSON over stdio.
    CliSubprocess,
    /// HTTP + SSE client against a remote engine service.
    RemoteApi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDef {
    pub id: String,
    pub kind: EngineKind,
    /// `CliSubprocess` only: executable to spawn.
    #[serde(default)]
    pub command: Option<String>,
    /// `CliSubprocess` only: arguments passed to `command`.
    #[serde(default)]
    pub args: Vec<String>,
    /// `RemoteApi` only: base URL the Job is POSTed to.
    #[serde(default)]
    pub base_url: Option<String>,
    /// `RemoteApi` only: auth for the remote call.
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    /// Model names this engine serves. Consulted by the orchestrator's
    /// model-implied engine-resolution tier: a request naming one of these
    /// models resolves to this engine absent a more specific override.
    #[serde(default)]
    pub models: Vec<String>,
}

/// How a remote-API engine authenticates against its base URL. Credentials
/// are resolved from an environment variable only — no OS-keychain
/// integration (out of scope for this core's thin reference adapters).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Environment variable holding the API key / bearer token.
    #[serde(default)]
    pub env: Option<String>,
    /// Literal key, for local/dev use. Prefer `env` in production.
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    None,
    Bearer,
    ApiKey,
    QueryParam,
}

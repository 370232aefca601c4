/// Shared error type used across the orchestration core's crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("engine {engine}: {message}")]
    Engine { engine: String, message: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("unknown engine: {0}")]
    UnknownEngine(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

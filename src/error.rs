use thiserror::Error;

/// Convenience alias for Results using [`OrchestratorError`].
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Error taxonomy for the orchestration engine.
///
/// Each variant maps to one row of the error table: callers match on the
/// variant, not the message, to decide how to respond (retry, surface to a
/// user, drop silently).
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state transition: {0}")]
    InvalidState(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("queue is full")]
    QueueFull,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("agent lost: {0}")]
    AgentLost(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Configuration load/validation errors, surfaced separately so startup
/// failures produce an actionable message before any subsystem starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(String),

    #[error("invalid value for {field}: {message}")]
    Invalid { field: String, message: String },
}

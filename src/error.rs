use thiserror::Error;

pub type Result<T> = std::result::Result<T, AguiError>;

#[derive(Debug, Error)]
pub enum AguiError {
    #[error("invalid run input: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("agent runner is not configured")]
    RunnerNotConfigured,

    #[error("user id resolution failed: {0}")]
    Resolve(String),

    #[error("agent run failed: {0}")]
    Agent(String),

    #[error("translation failed: {0}")]
    Translate(String),

    #[error("translate callback failed: {0}")]
    Callback(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

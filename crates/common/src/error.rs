use thiserror::Error;

#[derive(Debug, Error)]
pub enum AegisError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store backend error: {0}")]
    Store(String),

    #[error("store operation timed out after {0:?}")]
    StoreTimeout(std::time::Duration),

    #[error("pattern engine error: {0}")]
    PatternEngine(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type AegisResult<T> = Result<T, AegisError>;

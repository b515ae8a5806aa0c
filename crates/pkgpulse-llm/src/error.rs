use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM endpoint returned HTTP {0}")]
    Status(u16),

    #[error("model output contained no parseable JSON")]
    NoJson,

    #[error("unexpected response shape: {0}")]
    Schema(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LlmError>;

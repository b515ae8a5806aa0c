use thiserror::Error;

#[derive(Error, Debug)]
pub enum DepsDevError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("deserialization failed: {0}")]
    DeserializationFailed(#[from] serde_json::Error),

    #[error("API returned error: HTTP {0}")]
    ApiError(u16),

    #[error("rate limited by deps.dev API")]
    RateLimited,
}

pub type Result<T> = std::result::Result<T, DepsDevError>;

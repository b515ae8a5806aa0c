use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitHubError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("GitHub API returned HTTP {0}")]
    Status(u16),
}

pub type Result<T> = std::result::Result<T, GitHubError>;

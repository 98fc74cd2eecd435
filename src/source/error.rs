use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request timed out")]
    Timeout,
    #[error("rate limited by source (HTTP 429)")]
    RateLimited,
    #[error("source returned HTTP {0}")]
    Status(u16),
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

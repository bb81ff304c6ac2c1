use thiserror::Error;

/// Failure modes of a single scan attempt.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("credential not configured: {0}")]
    MissingCredential(String),

    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("empty response from vision endpoint")]
    EmptyResponse,

    #[error("capture or upload failed: {0}")]
    Capture(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CleanerError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Graph API error {status}: {body}")]
    Graph { status: StatusCode, body: String },
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CleanerResult<T> = Result<T, CleanerError>;

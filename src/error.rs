use thiserror::Error;

/// Errors surfaced by the gateway.
///
/// Delivery errors are recoverable by design: the scheduler requeues the
/// batch and retries on the next coalescing window. Config and I/O errors
/// are fatal at startup only.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid ingest URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("delivery request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ingest endpoint returned status {0}")]
    UpstreamStatus(u16),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

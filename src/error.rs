use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Network connection failed: {0}")]
    ConnectionError(String),

    #[error("WebSocket error: {0}")]
    SocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Failed to parse JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Internal channel closed")]
    ChannelClosed,

    #[error("Invalid URL")]
    UrlParseError(#[from] url::ParseError),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Pipeline already running")]
    AlreadyRunning,

    #[error("Job queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Failures reported by a [`crate::queue::JobQueue`] implementation.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The queue could not be reached or refused the batch. Recoverable.
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("queue request failed: {0}")]
    Http(#[from] reqwest::Error),
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("WebSocket connection error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Max reconnection attempts reached")]
    MaxReconnectsExceeded,

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No tokio runtime available to drive the channel")]
    NoRuntime,

    #[error("Metrics server error: {0}")]
    MetricsError(String),
}

use thiserror::Error;

pub type StreamResult<T> = Result<T, StreamError>;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("channel open failed: {0}")]
    TransportOpen(String),

    #[error("channel closed unexpectedly: {0}")]
    TransportClosed(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("snapshot poll failed: {0}")]
    PollFetch(String),

    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

use thiserror::Error;

/// Result type alias used throughout the relay.
pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration errors (missing or unparseable environment values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Session token acquisition failed.
    #[error("token fetch error: {0}")]
    Token(String),

    /// Opening the socket transport failed.
    #[error("connect error: {0}")]
    Connect(String),

    /// A frame was not parseable as JSON.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The notification sink rejected or failed a send.
    #[error("sink error: {0}")]
    Sink(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        RelayError::Config(msg.into())
    }

    pub fn token<S: Into<String>>(msg: S) -> Self {
        RelayError::Token(msg.into())
    }

    pub fn connect<S: Into<String>>(msg: S) -> Self {
        RelayError::Connect(msg.into())
    }

    pub fn sink<S: Into<String>>(msg: S) -> Self {
        RelayError::Sink(msg.into())
    }
}

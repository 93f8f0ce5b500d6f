//! Error types for MCP protocol operations

use thiserror::Error;

/// MCP protocol error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Core domain error: {0}")]
    Core(#[from] taskweave_core::Error),

    /// Failure raised by a tool, resource or prompt handler; the message is
    /// surfaced to the caller as-is
    #[error("{0}")]
    Handler(String),

    #[error("Connection limit reached: {0} active connections")]
    ConnectionLimit(usize),
}

impl Error {
    pub fn handler<S: Into<String>>(message: S) -> Self {
        Self::Handler(message.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

/// Convenience result type for MCP operations
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for the server application

use thiserror::Error;

/// Server application error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("MCP error: {0}")]
    Mcp(#[from] taskweave_mcp::Error),

    #[error("Core error: {0}")]
    Core(#[from] taskweave_core::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

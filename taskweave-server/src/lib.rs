//! Taskweave server application
//!
//! Wires the task configuration file into the dynamic tool generator, adds the
//! built-in server capabilities and runs the selected MCP transport.

use clap::ValueEnum;

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;

#[cfg(test)]
mod config_tests;

pub use error::{Error, Result};

pub use taskweave_core as core;
pub use taskweave_mcp as mcp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum McpTransport {
    /// Newline-delimited JSON-RPC over stdin/stdout
    Stdio,
    /// Server-Sent Events with HTTP POST for requests
    Sse,
}

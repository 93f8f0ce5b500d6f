//! Transport layer for MCP communication
//!
//! - **[`stdio`]**: newline-delimited envelopes over a pipe, one session per process
//! - **[`sse`]**: HTTP POST inbound plus Server-Sent Events outbound, many clients

use crate::Result;

pub mod sse;
pub mod stdio;

pub use sse::{ConnectionManager, SseConfig};
pub use stdio::StdioTransport;

/// Transport trait for message-at-a-time MCP communication
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Send a message
    async fn send(&mut self, message: &str) -> Result<()>;

    /// Receive the next message, `None` once the peer has closed
    async fn receive(&mut self) -> Result<Option<String>>;

    /// Close the transport
    async fn close(&mut self) -> Result<()>;
}

//! MCP protocol implementation for Taskweave
//!
//! This crate exposes configured tasks and workflows as Model Context
//! Protocol capabilities over JSON-RPC 2.0.
//!
//! # Architecture
//!
//! - **[`protocol`]**: JSON-RPC 2.0 envelopes and MCP 2024-11-05 payload types
//! - **[`registry`]**: tools, resources and prompts with their handlers
//! - **[`session`]**: per-connection initialization state
//! - **[`server`]**: the protocol engine routing one envelope to one response
//! - **[`transport`]**: STDIO and streaming (SSE) transports
//! - **[`client`]**: drives a server over STDIO or HTTP
//! - **[`generator`]**: builds tools from the task/workflow configuration
//! - **[`error`]**: error handling for protocol operations
//!
//! # Protocol Flow
//!
//! ```text
//! Client                          Server
//!   |                               |
//!   |-- initialize ---------------->|
//!   |<------------- initialize -----|
//!   |-- notifications/initialized ->|
//!   |                               |
//!   |-- tools/list ---------------->|
//!   |<-------------- tools list ----|
//!   |                               |
//!   |-- tools/call ---------------->|
//!   |<----------- content block ----|
//! ```
//!
//! Any method other than `initialize` sent before initialization is answered
//! with error `-32002`.

pub mod client;
pub mod error;
pub mod generator;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;

pub use client::{ClientInfo, McpClient};
pub use error::{Error, Result};
pub use generator::DynamicToolGenerator;
pub use registry::CapabilityRegistry;
pub use server::McpServer;
pub use session::Session;

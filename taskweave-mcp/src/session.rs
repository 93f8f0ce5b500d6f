//! Per-connection protocol session
//!
//! Every logical connection owns one [`Session`]: the STDIO transport keeps a
//! single session for the process, the streaming transport keeps one per
//! `Mcp-Session-Id`.

use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Initialized,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    state: SessionState,
    client_info: Option<Value>,
    protocol_version: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == SessionState::Initialized
    }

    /// Record the peer's declared identity; calling again renegotiates
    pub fn initialize(&mut self, client_info: Option<Value>, protocol_version: Option<String>) {
        self.state = SessionState::Initialized;
        self.client_info = client_info;
        self.protocol_version = protocol_version;
    }

    pub fn client_info(&self) -> Option<&Value> {
        self.client_info.as_ref()
    }

    /// Protocol version the client asked for in `initialize`
    pub fn requested_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }
}

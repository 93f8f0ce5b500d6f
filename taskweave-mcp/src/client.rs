//! MCP client
//!
//! Drives a server over any [`Transport`]: a spawned child process speaking
//! line-delimited STDIO, or HTTP POSTs against the streaming transport's
//! message endpoint.

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;

use reqwest::{header, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::protocol::{
    methods, CallToolResult, GetPromptResult, InitializeResult, JsonRpcResponse, Prompt,
    ReadResourceResult, Resource, Tool, JSONRPC_VERSION, MCP_VERSION,
};
use crate::transport::sse::ENDPOINT_PATH;
use crate::transport::{StdioTransport, Transport};
use crate::{Error, Result};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity announced in `initialize`
#[derive(Debug, Clone, PartialEq)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl ClientInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

#[derive(Deserialize)]
struct ToolList {
    tools: Vec<Tool>,
}

#[derive(Deserialize)]
struct ResourceList {
    resources: Vec<Resource>,
}

#[derive(Deserialize)]
struct PromptList {
    prompts: Vec<Prompt>,
}

/// MCP client for connecting to MCP servers
pub struct McpClient {
    transport: Box<dyn Transport>,
    client_info: ClientInfo,
    child: Option<Child>,
    next_id: i64,
    negotiated: Option<InitializeResult>,
}

impl McpClient {
    pub fn new(transport: Box<dyn Transport>, client_info: ClientInfo) -> Self {
        Self {
            transport,
            client_info,
            child: None,
            next_id: 0,
            negotiated: None,
        }
    }

    /// Spawn `program` and talk to it over its stdin/stdout
    ///
    /// The child is killed when the client is closed or dropped.
    pub fn connect_stdio(client_info: ClientInfo, program: &str, args: &[&str]) -> Result<Self> {
        info!("Connecting to MCP server via stdio: {}", program);
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Transport(format!("Failed to spawn {}: {}", program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Transport("Child stdin is not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("Child stdout is not piped".to_string()))?;

        let transport: StdioTransport<BufReader<ChildStdout>, ChildStdin> =
            StdioTransport::with_streams(BufReader::new(stdout), stdin);
        let mut client = Self::new(Box::new(transport), client_info);
        client.child = Some(child);
        Ok(client)
    }

    /// Talk to a streaming server at `base_url` by posting to its message endpoint
    pub fn connect_sse(client_info: ClientInfo, base_url: &str) -> Result<Self> {
        let transport = HttpTransport::new(base_url)?;
        info!("Connecting to MCP server via HTTP: {}", transport.endpoint);
        Ok(Self::new(Box::new(transport), client_info))
    }

    /// Perform the `initialize` handshake and send `notifications/initialized`
    pub async fn initialize(&mut self) -> Result<&InitializeResult> {
        let params = json!({
            "protocolVersion": MCP_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": self.client_info.name,
                "version": self.client_info.version,
            },
        });
        let result: InitializeResult = self.request(methods::INITIALIZE, params).await?;
        info!(
            "Connected to {} {} (protocol {})",
            result.server_info.name, result.server_info.version, result.protocol_version
        );

        let notification = json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": "notifications/initialized",
        });
        self.transport.send(&notification.to_string()).await?;

        Ok(&*self.negotiated.insert(result))
    }

    pub fn server_name(&self) -> Option<&str> {
        self.negotiated.as_ref().map(|r| r.server_info.name.as_str())
    }

    pub fn server_version(&self) -> Option<&str> {
        self.negotiated.as_ref().map(|r| r.server_info.version.as_str())
    }

    pub fn protocol_version(&self) -> Option<&str> {
        self.negotiated.as_ref().map(|r| r.protocol_version.as_str())
    }

    pub async fn ping(&mut self) -> Result<()> {
        let _: Value = self.request(methods::PING, Value::Null).await?;
        Ok(())
    }

    pub async fn list_tools(&mut self) -> Result<Vec<Tool>> {
        let list: ToolList = self.request(methods::LIST_TOOLS, Value::Null).await?;
        Ok(list.tools)
    }

    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallToolResult> {
        self.request(
            methods::CALL_TOOL,
            json!({"name": name, "arguments": arguments}),
        )
        .await
    }

    pub async fn list_resources(&mut self) -> Result<Vec<Resource>> {
        let list: ResourceList = self.request(methods::LIST_RESOURCES, Value::Null).await?;
        Ok(list.resources)
    }

    pub async fn read_resource(&mut self, uri: &str) -> Result<ReadResourceResult> {
        self.request(methods::READ_RESOURCE, json!({"uri": uri})).await
    }

    pub async fn list_prompts(&mut self) -> Result<Vec<Prompt>> {
        let list: PromptList = self.request(methods::LIST_PROMPTS, Value::Null).await?;
        Ok(list.prompts)
    }

    pub async fn get_prompt(&mut self, name: &str, arguments: Value) -> Result<GetPromptResult> {
        self.request(
            methods::GET_PROMPT,
            json!({"name": name, "arguments": arguments}),
        )
        .await
    }

    /// Close the transport and stop a spawned server
    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await?;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!("Failed to stop MCP server process: {}", e);
            }
        }
        info!("MCP client connection closed");
        Ok(())
    }

    /// Send one request and wait for the response carrying its id
    async fn request<T: DeserializeOwned>(&mut self, method: &str, params: Value) -> Result<T> {
        self.next_id += 1;
        let id = json!(self.next_id);

        let mut message = json!({"jsonrpc": JSONRPC_VERSION, "id": id, "method": method});
        if !params.is_null() {
            message["params"] = params;
        }
        self.transport.send(&message.to_string()).await?;
        debug!("Sent {} request {}", method, id);

        let response = loop {
            let line = self.transport.receive().await?.ok_or_else(|| {
                Error::Transport(format!("Connection closed awaiting {} response", method))
            })?;
            match serde_json::from_str::<JsonRpcResponse>(&line) {
                Ok(response) if response.id == id => break response,
                Ok(response) => debug!("Skipping response for id {}", response.id),
                Err(e) => debug!("Skipping unreadable line: {}", e),
            }
        };

        if let Some(error) = response.error {
            return Err(Error::Protocol {
                message: format!("{} failed ({}): {}", method, error.code, error.message),
            });
        }
        let result = response.result.ok_or_else(|| Error::Protocol {
            message: format!("No result in {} response", method),
        })?;
        Ok(serde_json::from_value(result)?)
    }
}

/// Request/response transport over the streaming server's POST endpoint
///
/// Each sent envelope is one POST; reply bodies queue up for `receive`.
/// Accepted notifications (`202`) produce nothing to receive.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
    pending: VecDeque<String>,
    is_closed: bool,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        let endpoint = Url::parse(base_url)
            .and_then(|base| base.join(ENDPOINT_PATH))
            .map_err(|e| Error::Transport(format!("Invalid server url {}: {}", base_url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            pending: VecDeque::new(),
            is_closed: false,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&mut self, message: &str) -> Result<()> {
        if self.is_closed {
            return Err(Error::Transport("HTTP transport is closed".to_string()));
        }

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .body(message.to_string())
            .send()
            .await
            .map_err(|e| Error::Transport(format!("POST {} failed: {}", self.endpoint, e)))?;

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Ok(());
        }
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("Failed to read response body: {}", e)))?;

        // Protocol errors come back as envelopes with a 4xx/5xx status
        if status.is_success() || serde_json::from_str::<JsonRpcResponse>(&body).is_ok() {
            self.pending.push_back(body);
            Ok(())
        } else {
            Err(Error::Transport(format!("HTTP {}: {}", status, body)))
        }
    }

    async fn receive(&mut self) -> Result<Option<String>> {
        Ok(self.pending.pop_front())
    }

    async fn close(&mut self) -> Result<()> {
        self.is_closed = true;
        self.pending.clear();
        Ok(())
    }
}

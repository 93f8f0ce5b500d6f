//! Line-delimited STDIO transport
//!
//! One envelope per line in each direction. Requests are handled strictly in
//! arrival order; end of input ends the loop. Nothing but envelopes is ever
//! written to the output stream.

use serde_json::Value;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
};
use tracing::{debug, error, info, warn};

use super::Transport;
use crate::protocol::JsonRpcResponse;
use crate::server::{expects_reply, parse_error, McpServer};
use crate::session::Session;
use crate::{Error, Result};

pub struct StdioTransport<R, W> {
    reader: R,
    writer: W,
    is_closed: bool,
}

impl StdioTransport<BufReader<Stdin>, Stdout> {
    /// Transport over the process's stdin/stdout
    pub fn new() -> Self {
        Self::with_streams(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl Default for StdioTransport<BufReader<Stdin>, Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn with_streams(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            is_closed: false,
        }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

#[async_trait::async_trait]
impl<R, W> Transport for StdioTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: &str) -> Result<()> {
        if self.is_closed {
            return Err(Error::Transport("Stdio transport is closed".to_string()));
        }
        if message.contains('\n') {
            return Err(Error::Transport(
                "Message contains embedded newline".to_string(),
            ));
        }

        self.writer.write_all(message.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<String>> {
        if self.is_closed {
            return Ok(None);
        }

        let mut line = Vec::new();
        let read = self.reader.read_until(b'\n', &mut line).await?;
        if read == 0 {
            info!("Stdin reached EOF, closing transport");
            self.is_closed = true;
            return Ok(None);
        }

        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        String::from_utf8(line).map(Some).map_err(|e| Error::Protocol {
            message: format!("input is not valid UTF-8: {}", e),
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.is_closed = true;
        self.writer.flush().await?;
        debug!("Stdio transport closed");
        Ok(())
    }
}

/// Serve one session over `transport` until the peer closes it
///
/// Unreadable lines are answered with a parse error and the loop carries on.
pub async fn serve<T: Transport>(server: &McpServer, transport: &mut T) -> Result<()> {
    let mut session = Session::new();
    info!(
        "MCP server '{}' serving over stdio",
        server.server_info().name
    );

    loop {
        let line = match transport.receive().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(Error::Protocol { message }) => {
                warn!("Unreadable input line: {}", message);
                reply(transport, &parse_error(message)).await?;
                continue;
            }
            Err(e) => return Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Value>(&line) {
            Ok(message) => {
                let response = server.handle(&mut session, &message).await;
                if !expects_reply(&message) {
                    continue;
                }
                response
            }
            Err(e) => {
                warn!("Failed to parse inbound message: {}", e);
                parse_error(e)
            }
        };
        reply(transport, &response).await?;
    }

    transport.close().await
}

async fn reply<T: Transport>(transport: &mut T, response: &JsonRpcResponse) -> Result<()> {
    let encoded = match serde_json::to_string(response) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!("Failed to encode response: {}", e);
            return Ok(());
        }
    };
    transport.send(&encoded).await.map_err(|e| {
        warn!("Failed to write response: {}", e);
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerInfo;
    use crate::registry::CapabilityRegistry;
    use serde_json::json;

    fn server() -> McpServer {
        let mut registry = CapabilityRegistry::new();
        registry.register_tool_fn("echo", "", json!({}), Ok);
        McpServer::new(
            ServerInfo {
                name: "stdio-test".to_string(),
                version: "1".to_string(),
            },
            registry,
        )
    }

    async fn run(input: &str) -> Vec<Value> {
        run_bytes(input.as_bytes()).await
    }

    async fn run_bytes(input: &[u8]) -> Vec<Value> {
        let mut transport = StdioTransport::with_streams(input, Vec::new());
        serve(&server(), &mut transport).await.unwrap();
        String::from_utf8(transport.into_writer())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_one_reply_per_request_in_order() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo","arguments":{"x":1}}}"#,
            "\n",
        );

        let replies = run(input).await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["id"], 1);
        assert_eq!(replies[1]["id"], 2);
        assert_eq!(replies[1]["result"]["content"][0]["text"], r#"{"x":1}"#);
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_stop_the_loop() {
        let input = "this is not json\n{\"jsonrpc\":\"2.0\",\"id\":9,\"method\":\"ping\"}\n";

        let replies = run(input).await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["error"]["code"], -32700);
        assert_eq!(replies[1]["error"]["code"], -32002);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_answered_and_skipped() {
        let mut input = b"\xff\xfe garbage\n".to_vec();
        input.extend_from_slice(br#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#);
        input.extend_from_slice(b"\r\n");

        let replies = run_bytes(&input).await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["error"]["code"], -32700);
        assert_eq!(replies[0]["id"], -1);
        assert_eq!(replies[1]["id"], 3);
        assert_eq!(replies[1]["error"]["code"], -32002);
    }

    #[tokio::test]
    async fn test_send_rejects_embedded_newlines() {
        let mut transport = StdioTransport::with_streams(&b""[..], Vec::new());
        assert!(transport.send("a\nb").await.is_err());
    }
}

//! Shell command backend

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use super::{error_payload, TaskBackend};
use crate::placeholder::substitute;

/// Runs `config.command` through `sh -c` after parameter substitution
pub struct TerminalBackend {
    default_timeout: Duration,
}

impl TerminalBackend {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

#[async_trait]
impl TaskBackend for TerminalBackend {
    fn operation_type(&self) -> &'static str {
        "terminal"
    }

    async fn execute(&self, config: &Value, params: &Value) -> Value {
        let template = config.get("command").and_then(Value::as_str).unwrap_or("");
        if template.is_empty() {
            return error_payload("Terminal error: no command configured");
        }

        let empty = serde_json::Map::new();
        let command = substitute(template, params.as_object().unwrap_or(&empty));
        let timeout = config
            .get("timeout")
            .and_then(Value::as_u64)
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        info!("Executing command: {}", command);

        let child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return error_payload(format!("Terminal error: failed to execute command: {}", e))
            }
            Err(_) => {
                warn!("Command timed out after {:?}: {}", timeout, command);
                return error_payload(format!(
                    "Terminal error: command timed out after {}s",
                    timeout.as_secs()
                ));
            }
        };

        let returncode = output.status.code().unwrap_or(-1);
        json!({
            "success": output.status.success(),
            "returncode": returncode,
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "command": command,
        })
    }
}

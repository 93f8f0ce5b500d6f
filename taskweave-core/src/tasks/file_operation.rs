//! File read/write/append backend

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::{error_payload, TaskBackend};

pub struct FileOperationBackend;

impl FileOperationBackend {
    async fn read(file_path: &str) -> Value {
        match tokio::fs::read_to_string(file_path).await {
            Ok(content) => json!({
                "success": true,
                "size": content.len(),
                "content": content,
                "file_path": file_path,
            }),
            Err(_) => error_payload(format!("File not found: {}", file_path)),
        }
    }

    async fn write(file_path: &str, content: &str, append: bool, create_dirs: bool) -> Value {
        let verb = if append { "appending" } else { "writing" };

        if create_dirs {
            let parent = Path::new(file_path)
                .parent()
                .filter(|p| !p.as_os_str().is_empty());
            if let Some(parent) = parent {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return error_payload(format!(
                        "Failed to create directories for {}: {}",
                        file_path, e
                    ));
                }
            }
        }

        let opened = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(file_path)
            .await;
        let mut file = match opened {
            Ok(file) => file,
            Err(_) => {
                return error_payload(format!("Failed to open file for {}: {}", verb, file_path))
            }
        };

        if let Err(e) = file.write_all(content.as_bytes()).await {
            return error_payload(format!("File operation error: {}", e));
        }
        if let Err(e) = file.flush().await {
            return error_payload(format!("File operation error: {}", e));
        }

        let message = if append {
            format!("Appended {} characters to {}", content.chars().count(), file_path)
        } else {
            format!("Written {} characters to {}", content.chars().count(), file_path)
        };
        json!({
            "success": true,
            "message": message,
            "file_path": file_path,
        })
    }
}

#[async_trait]
impl TaskBackend for FileOperationBackend {
    fn operation_type(&self) -> &'static str {
        "file_operation"
    }

    async fn execute(&self, config: &Value, params: &Value) -> Value {
        let action = config.get("action").and_then(Value::as_str).unwrap_or("read");
        let create_dirs = config.get("create_dirs").and_then(Value::as_bool).unwrap_or(false);

        let Some(file_path) = params.get("file_path").and_then(Value::as_str) else {
            return error_payload("file_path is required");
        };

        info!("File operation: {} {}", action, file_path);

        match action {
            "read" => Self::read(file_path).await,
            "write" | "append" => {
                let Some(content) = params.get("content").and_then(Value::as_str) else {
                    return error_payload(format!("content is required for {} operation", action));
                };
                Self::write(file_path, content, action == "append", create_dirs).await
            }
            other => error_payload(format!("Unknown action: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_append_read_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        let path_str = path.to_str().unwrap();
        let backend = FileOperationBackend;

        let written = backend
            .execute(
                &json!({"action": "write"}),
                &json!({"file_path": path_str, "content": "hello"}),
            )
            .await;
        assert_eq!(written["success"], true);
        assert_eq!(
            written["message"],
            format!("Written 5 characters to {}", path_str)
        );

        backend
            .execute(
                &json!({"action": "append"}),
                &json!({"file_path": path_str, "content": " world"}),
            )
            .await;

        let read = backend
            .execute(&json!({"action": "read"}), &json!({"file_path": path_str}))
            .await;
        assert_eq!(read["content"], "hello world");
        assert_eq!(read["size"], 11);
    }

    #[tokio::test]
    async fn test_create_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.txt");
        let result = FileOperationBackend
            .execute(
                &json!({"action": "write", "create_dirs": true}),
                &json!({"file_path": path.to_str().unwrap(), "content": "x"}),
            )
            .await;
        assert_eq!(result["success"], true);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_parameter_validation() {
        let backend = FileOperationBackend;

        let missing_path = backend.execute(&json!({}), &json!({})).await;
        assert_eq!(missing_path["error"], "file_path is required");

        let missing_content = backend
            .execute(&json!({"action": "write"}), &json!({"file_path": "/tmp/x"}))
            .await;
        assert_eq!(
            missing_content["error"],
            "content is required for write operation"
        );

        let unknown = backend
            .execute(&json!({"action": "delete"}), &json!({"file_path": "/tmp/x"}))
            .await;
        assert_eq!(unknown["error"], "Unknown action: delete");
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let result = FileOperationBackend
            .execute(&json!({}), &json!({"file_path": "/no/such/file.txt"}))
            .await;
        assert_eq!(result["error"], "File not found: /no/such/file.txt");
    }
}

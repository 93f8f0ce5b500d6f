//! In-process JSON and CSV parsing

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{error_payload, TaskBackend};

pub struct DataProcessingBackend;

impl DataProcessingBackend {
    fn parse_json(params: &Value) -> Value {
        let Some(text) = params.get("json_string").and_then(Value::as_str) else {
            return error_payload("json_string is required");
        };
        match serde_json::from_str::<Value>(text) {
            Ok(data) => json!({
                "success": true,
                "data": data,
                "processor": "json_parser",
            }),
            Err(e) => error_payload(format!("JSON parse error: {}", e)),
        }
    }

    /// Naive split on the delimiter; quoting is not interpreted
    fn transform_csv(config: &Value, params: &Value) -> Value {
        let Some(csv_data) = params.get("csv_data").and_then(Value::as_str) else {
            return error_payload("csv_data is required");
        };
        let operation = params
            .get("operation")
            .and_then(Value::as_str)
            .unwrap_or("parse");
        let delimiter = config
            .get("delimiter")
            .and_then(Value::as_str)
            .and_then(|d| d.chars().next())
            .unwrap_or(',');

        let rows: Vec<Vec<&str>> = csv_data
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| line.split(delimiter).collect())
            .collect();

        json!({
            "success": true,
            "row_count": rows.len(),
            "rows": rows,
            "processor": "csv_transformer",
            "operation": operation,
        })
    }
}

#[async_trait]
impl TaskBackend for DataProcessingBackend {
    fn operation_type(&self) -> &'static str {
        "data_processing"
    }

    async fn execute(&self, config: &Value, params: &Value) -> Value {
        match config
            .get("processor")
            .and_then(Value::as_str)
            .unwrap_or("json_parser")
        {
            "json_parser" => Self::parse_json(params),
            "csv_transformer" => Self::transform_csv(config, params),
            other => error_payload(format!("Unknown processor: {}", other)),
        }
    }
}

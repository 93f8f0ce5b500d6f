//! Simulated SQL backend
//!
//! Renders the configured query with SQL-quoted parameters and reports what
//! would have been executed. No database connection is opened.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::TaskBackend;
use crate::placeholder::substitute_with;

pub struct DatabaseBackend;

/// SQL literal for a parameter value
fn sql_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => other.to_string(),
    }
}

impl DatabaseBackend {
    pub fn render_query(template: &str, params: &Value) -> String {
        substitute_with(template, |name| params.get(name).map(sql_literal))
    }
}

#[async_trait]
impl TaskBackend for DatabaseBackend {
    fn operation_type(&self) -> &'static str {
        "database"
    }

    async fn execute(&self, config: &Value, params: &Value) -> Value {
        let db_type = config
            .get("db_type")
            .and_then(Value::as_str)
            .unwrap_or("postgresql");
        let template = config.get("query").and_then(Value::as_str).unwrap_or("");
        let query = Self::render_query(template, params);

        info!("Database {} query: {}", db_type, query);

        json!({
            "success": true,
            "message": format!("Database operation simulated (would execute: {})", query),
            "db_type": db_type,
            "query": query,
            "note": "Install database drivers for real operations",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strings_are_quoted_and_escaped() {
        let query = DatabaseBackend::render_query(
            "SELECT * FROM users WHERE name = {name} AND age > {age}",
            &json!({"name": "O'Brien", "age": 30}),
        );
        assert_eq!(
            query,
            "SELECT * FROM users WHERE name = 'O''Brien' AND age > 30"
        );
    }

    #[tokio::test]
    async fn test_simulated_result() {
        let result = DatabaseBackend
            .execute(
                &json!({"query": "DELETE FROM t WHERE id = {id}", "db_type": "sqlite"}),
                &json!({"id": 5}),
            )
            .await;
        assert_eq!(result["success"], true);
        assert_eq!(result["db_type"], "sqlite");
        assert_eq!(result["query"], "DELETE FROM t WHERE id = 5");
    }

    #[tokio::test]
    async fn test_defaults_to_postgresql() {
        let result = DatabaseBackend
            .execute(&json!({"query": "SELECT 1"}), &json!({}))
            .await;
        assert_eq!(result["db_type"], "postgresql");
    }
}

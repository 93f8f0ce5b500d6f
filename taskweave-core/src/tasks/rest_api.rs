//! Outbound HTTP backend
//!
//! Requests use a fixed timeout and are never retried.

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{info, warn};

use super::{error_payload, TaskBackend};
use crate::placeholder::{substitute, substitute_json, value_to_text};

pub struct RestApiBackend {
    client: reqwest::Client,
    timeout: Duration,
}

impl RestApiBackend {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Final URL after substitution, with query parameters percent-encoded
    pub fn build_url(config: &Value, params: &Map<String, Value>) -> Result<Url, String> {
        let base = substitute(config.get("url").and_then(Value::as_str).unwrap_or(""), params);
        if base.is_empty() {
            return Err("no url configured".to_string());
        }
        let mut url = Url::parse(&base).map_err(|e| format!("invalid url {}: {}", base, e))?;

        let query = config
            .get("query_params")
            .map(|q| substitute_json(q, params))
            .unwrap_or(Value::Null);
        if let Some(query) = query.as_object().filter(|q| !q.is_empty()) {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), value_to_text(v))));
        }

        Ok(url)
    }
}

#[async_trait]
impl TaskBackend for RestApiBackend {
    fn operation_type(&self) -> &'static str {
        "rest_api"
    }

    async fn execute(&self, config: &Value, params: &Value) -> Value {
        let empty = Map::new();
        let params = params.as_object().unwrap_or(&empty);

        let method_name = config
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();
        let method = match method_name.as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            other => return error_payload(format!("REST API error: unsupported method {}", other)),
        };

        let url = match Self::build_url(config, params) {
            Ok(url) => url,
            Err(e) => return error_payload(format!("REST API error: {}", e)),
        };

        info!("REST API: {} {}", method_name, url);

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .timeout(self.timeout);

        if let Some(headers) = config.get("headers").map(|h| substitute_json(h, params)) {
            if let Some(headers) = headers.as_object() {
                for (name, value) in headers {
                    request = request.header(name.as_str(), value_to_text(value));
                }
            }
        }

        if method == Method::POST || method == Method::PUT {
            let body = config
                .get("body")
                .map(|b| substitute_json(b, params))
                .unwrap_or(Value::Null);
            let has_body = match &body {
                Value::Null => false,
                Value::Object(map) => !map.is_empty(),
                _ => true,
            };
            if has_body {
                request = request.json(&body);
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("REST API request to {} failed: {}", url, e);
                return error_payload(format!("REST API error: {}", e));
            }
        };

        let status_code = response.status().as_u16();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return error_payload(format!("REST API error: {}", e)),
        };
        let data = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        json!({
            "success": true,
            "status_code": status_code,
            "data": data,
            "method": method_name,
            "url": url.as_str(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_of(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_build_url_substitutes_and_appends_query() {
        let config = json!({
            "url": "https://api.example.com/users/{user_id}",
            "query_params": {"limit": "{limit}", "format": "json"}
        });
        let params = json!({"user_id": 42, "limit": 10});

        let url = RestApiBackend::build_url(&config, params.as_object().unwrap()).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/users/42?format=json&limit=10");
    }

    #[test]
    fn test_build_url_extends_existing_query() {
        let config = json!({"url": "http://h/x?a=1", "query_params": {"b": "2"}});
        let url = RestApiBackend::build_url(&config, &Map::new()).unwrap();
        assert_eq!(url.as_str(), "http://h/x?a=1&b=2");
    }

    #[test]
    fn test_query_values_are_encoded() {
        let config = json!({"url": "http://h/search", "query_params": {"q": "{q}"}});
        let params = json!({"q": "a&admin=true b#frag"});

        let url = RestApiBackend::build_url(&config, params.as_object().unwrap()).unwrap();
        assert_eq!(
            query_of(&url),
            vec![("q".to_string(), "a&admin=true b#frag".to_string())]
        );
        assert!(url.fragment().is_none());
    }

    #[tokio::test]
    async fn test_missing_or_invalid_url_is_payload() {
        let backend = RestApiBackend::new(Duration::from_secs(1));
        let missing = backend.execute(&json!({}), &json!({})).await;
        assert_eq!(missing["error"], "REST API error: no url configured");

        let invalid = backend.execute(&json!({"url": "not a url"}), &json!({})).await;
        assert_eq!(invalid["success"], false);
        assert!(invalid["error"].as_str().unwrap().contains("invalid url not a url"));
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let backend = RestApiBackend::new(Duration::from_secs(1));
        let result = backend
            .execute(&json!({"url": "http://localhost", "method": "PATCH"}), &json!({}))
            .await;
        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().unwrap().contains("PATCH"));
    }

    #[tokio::test]
    async fn test_connection_failure_is_payload() {
        let backend = RestApiBackend::new(Duration::from_secs(2));
        // Port 9 (discard) on localhost is not expected to serve HTTP
        let result = backend
            .execute(&json!({"url": "http://127.0.0.1:9/"}), &json!({}))
            .await;
        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().unwrap().starts_with("REST API error"));
    }
}

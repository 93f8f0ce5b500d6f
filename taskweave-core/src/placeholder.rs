//! `{name}` placeholder substitution
//!
//! Tokens are replaced in a single left-to-right pass, so a substituted value
//! that itself contains `{...}` is never expanded again. Tokens without a
//! matching variable are left exactly as written.

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern is valid"))
}

/// Text form of a value: strings verbatim, everything else as compact JSON
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace `{name}` tokens using `lookup`; unresolved tokens are kept
pub fn substitute_with<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    token_pattern()
        .replace_all(text, |caps: &Captures| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Substitute from a JSON object of parameters
pub fn substitute(text: &str, params: &Map<String, Value>) -> String {
    substitute_with(text, |name| params.get(name).map(value_to_text))
}

/// Substitute from the workflow variable namespace
pub fn substitute_vars(text: &str, variables: &HashMap<String, Value>) -> String {
    substitute_with(text, |name| variables.get(name).map(value_to_text))
}

/// Apply [`substitute`] to every string nested inside `value`
pub fn substitute_json(value: &Value, params: &Map<String, Value>) -> Value {
    match value {
        Value::String(s) => Value::String(substitute(s, params)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| substitute_json(v, params)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_json(v, params)))
                .collect(),
        ),
        other => other.clone(),
    }
}

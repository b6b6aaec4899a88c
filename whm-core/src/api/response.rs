//! Response body classification.

use serde_json::{Map, Value};
use tracing::warn;

/// A response body, classified by its first non-whitespace character.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    Object(Map<String, Value>),
    Array(Vec<Value>),
    Text(String),
}

impl ParsedResponse {
    /// Classifies a response body.
    ///
    /// `{` parses as an object and `[` as an array. Anything else, including
    /// a body that looks like JSON but doesn't parse, is kept as text.
    pub fn parse(body: &str) -> Self {
        match body.trim_start().chars().next() {
            Some('{') => match serde_json::from_str(body) {
                Ok(map) => ParsedResponse::Object(map),
                Err(e) => {
                    warn!(error = %e, "Response looked like a JSON object but failed to parse");
                    ParsedResponse::Text(body.to_string())
                }
            },
            Some('[') => match serde_json::from_str(body) {
                Ok(items) => ParsedResponse::Array(items),
                Err(e) => {
                    warn!(error = %e, "Response looked like a JSON array but failed to parse");
                    ParsedResponse::Text(body.to_string())
                }
            },
            _ => ParsedResponse::Text(body.to_string()),
        }
    }

    /// Returns the object if this response is one.
    pub fn into_object(self) -> Option<Map<String, Value>> {
        match self {
            ParsedResponse::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Short name of the body kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ParsedResponse::Object(_) => "object",
            ParsedResponse::Array(_) => "array",
            ParsedResponse::Text(_) => "text",
        }
    }

    /// Converts to a JSON value; text becomes a JSON string.
    pub fn into_value(self) -> Value {
        match self {
            ParsedResponse::Object(map) => Value::Object(map),
            ParsedResponse::Array(items) => Value::Array(items),
            ParsedResponse::Text(text) => Value::String(text),
        }
    }
}

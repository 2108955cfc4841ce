//! `json_schema` response format and structured answer parsing.

use crate::error_code::ProviderErrorKind;
use crate::{Error, ErrorContext, Result};
use serde_json::{json, Value};

/// A named JSON Schema the model's answer must follow.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub strict: bool,
    pub schema: Value,
}

impl JsonSchemaFormat {
    /// Strict by default.
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            strict: true,
            schema,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Checks what vendors reject: names are 1-64 of `[A-Za-z0-9_-]`, the
    /// schema is a JSON object.
    pub fn validate(&self) -> Result<()> {
        let name_ok = !self.name.is_empty()
            && self.name.len() <= 64
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !name_ok {
            return Err(Error::validation_with_context(
                format!("invalid schema name '{}'", self.name),
                ErrorContext::new()
                    .with_field_path("response_format.json_schema.name")
                    .with_details("1-64 characters of a-z, A-Z, 0-9, _ and -"),
            ));
        }
        if !self.schema.is_object() {
            return Err(Error::validation_with_context(
                "schema must be a JSON object",
                ErrorContext::new().with_field_path("response_format.json_schema.schema"),
            ));
        }
        Ok(())
    }

    /// Value for the chat completions `response_format` parameter.
    pub fn to_response_format(&self) -> Value {
        json!({
            "type": "json_schema",
            "json_schema": {
                "name": self.name,
                "strict": self.strict,
                "schema": self.schema,
            }
        })
    }
}

/// Parses a structured answer. A fenced ```` ```json ```` block is unwrapped;
/// anything that is not JSON is an upstream error.
pub fn parse_structured(provider: &str, text: &str) -> Result<Value> {
    let body = unfence(text.trim());
    serde_json::from_str(body).map_err(|e| {
        Error::provider(
            provider,
            ProviderErrorKind::Upstream,
            format!("structured answer is not valid JSON: {}", e),
        )
    })
}

fn unfence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

//! Response normalization.
//!
//! Tool and resource responses come in several shapes. Normalization first
//! pulls the text out of the response, then tries to read that text as JSON,
//! then as a permissive literal, and otherwise keeps it as plain text. It never
//! fails.

use crate::literal::parse_literal;
use quarry_mcp::RawResponse;
use serde_json::Value;

/// Canonical form of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedValue {
    Structured(Value),
    Text(String),
}

impl NormalizedValue {
    /// The value as display text: strings bare, structures as compact JSON.
    pub fn to_message(&self) -> String {
        match self {
            NormalizedValue::Text(text) => text.clone(),
            NormalizedValue::Structured(Value::String(s)) => s.clone(),
            NormalizedValue::Structured(value) => value.to_string(),
        }
    }

    /// Raw form that normalizes back to this value.
    pub fn to_raw(&self) -> RawResponse {
        match self {
            NormalizedValue::Text(text) => RawResponse::Text(text.clone()),
            NormalizedValue::Structured(value) => RawResponse::Text(value.to_string()),
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            NormalizedValue::Structured(value) => Some(value),
            NormalizedValue::Text(_) => None,
        }
    }

    /// Elements of a structured array, or `None` for any other shape.
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        self.as_structured().and_then(Value::as_array)
    }
}

/// Text carried by the response, probed in precedence order.
///
/// `None` means the response has no recognizable text and only its default
/// rendering is available.
pub fn text_content(response: &RawResponse) -> Option<&str> {
    match response {
        RawResponse::ToolResult { content, .. } => content.first().and_then(|c| c.text()),
        RawResponse::Content { content } => content.text(),
        RawResponse::Resource { contents } => contents.first().and_then(|c| c.text.as_deref()),
        RawResponse::Text(text) => Some(text),
        RawResponse::Value(Value::String(text)) => Some(text),
        RawResponse::Value(_) => None,
    }
}

/// The text normalization operates on: the text content, or the response's
/// default rendering when it has none.
pub fn extract_text(response: &RawResponse) -> String {
    match text_content(response) {
        Some(text) => text.to_string(),
        None => response.to_string(),
    }
}

/// Normalize a response into structured data or plain text.
pub fn normalize(response: &RawResponse) -> NormalizedValue {
    parse_text(extract_text(response))
}

/// JSON first, then literal syntax, otherwise the text unchanged.
pub fn parse_text(text: String) -> NormalizedValue {
    if let Ok(value) = serde_json::from_str::<Value>(&text) {
        return NormalizedValue::Structured(value);
    }
    match parse_literal(&text) {
        Ok(value) => NormalizedValue::Structured(value),
        Err(e) => {
            tracing::trace!("Response kept as text ({e})");
            NormalizedValue::Text(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_mcp::{McpToolContent, ResourceContents};
    use serde_json::json;

    fn wrapped_direct(text: &str) -> RawResponse {
        RawResponse::Content {
            content: McpToolContent::Text { text: text.into() },
        }
    }

    #[test]
    fn content_list_uses_first_text_item() {
        let raw = RawResponse::ToolResult {
            content: vec![
                McpToolContent::Text {
                    text: r#"[{"name": "users"}]"#.into(),
                },
                McpToolContent::Text {
                    text: "ignored".into(),
                },
            ],
            is_error: false,
        };
        assert_eq!(
            normalize(&raw),
            NormalizedValue::Structured(json!([{"name": "users"}]))
        );
    }

    #[test]
    fn wrapped_content_with_direct_text() {
        assert_eq!(
            normalize(&wrapped_direct("Table created")),
            NormalizedValue::Text("Table created".into())
        );
    }

    #[test]
    fn python_repr_payload_is_structured() {
        let raw = RawResponse::tool_text("[{'affected_rows': 3}]");
        assert_eq!(
            normalize(&raw),
            NormalizedValue::Structured(json!([{"affected_rows": 3}]))
        );
    }

    #[test]
    fn plain_text_stays_text() {
        assert_eq!(
            normalize(&RawResponse::text("OK")),
            NormalizedValue::Text("OK".into())
        );
    }

    #[test]
    fn resource_contents_use_first_entry_text() {
        let raw = RawResponse::resource_text("memo://insights", "# Memo");
        assert_eq!(text_content(&raw), Some("# Memo"));
    }

    #[test]
    fn first_item_without_text_falls_back_to_rendering() {
        let raw = RawResponse::ToolResult {
            content: vec![McpToolContent::Image {
                data: "AAAA".into(),
                mime_type: "image/png".into(),
            }],
            is_error: false,
        };
        assert!(text_content(&raw).is_none());
        // The rendering is JSON, so it normalizes to the structure itself
        let value = normalize(&raw);
        let structured = value.as_structured().unwrap();
        assert_eq!(structured["content"][0]["mimeType"], "image/png");
    }

    #[test]
    fn empty_content_list_falls_back_to_rendering() {
        let raw = RawResponse::ToolResult {
            content: vec![],
            is_error: false,
        };
        assert_eq!(
            normalize(&raw),
            NormalizedValue::Structured(json!({"content": [], "isError": false}))
        );
    }

    #[test]
    fn resource_without_text_falls_back_to_rendering() {
        let raw = RawResponse::Resource {
            contents: vec![ResourceContents {
                uri: "memo://insights".into(),
                mime_type: None,
                text: None,
                blob: Some("AAAA".into()),
            }],
        };
        assert!(text_content(&raw).is_none());
        assert!(extract_text(&raw).contains("memo://insights"));
    }

    #[test]
    fn bare_json_value_is_rendered_then_parsed() {
        let raw = RawResponse::Value(json!({"affected_rows": 2}));
        assert_eq!(
            normalize(&raw),
            NormalizedValue::Structured(json!({"affected_rows": 2}))
        );
        assert_eq!(
            normalize(&RawResponse::Value(json!("done"))),
            NormalizedValue::Text("done".into())
        );
    }

    #[test]
    fn normalization_is_idempotent_over_raw_form() {
        let shapes = vec![
            RawResponse::text("plain words"),
            RawResponse::text(r#"{"count": 2, "ok": true}"#),
            RawResponse::tool_text("[{'id': 1}, {'id': 2}]"),
            wrapped_direct("\"quoted\""),
            wrapped_direct("42"),
        ];
        for raw in shapes {
            let once = normalize(&raw);
            let twice = normalize(&once.to_raw());
            assert_eq!(twice, once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn to_message_unwraps_strings() {
        assert_eq!(
            NormalizedValue::Structured(json!("Insight added")).to_message(),
            "Insight added"
        );
        assert_eq!(
            NormalizedValue::Structured(json!({"a": 1})).to_message(),
            r#"{"a":1}"#
        );
        assert_eq!(NormalizedValue::Text("x".into()).to_message(), "x");
    }

    #[test]
    fn deeply_nested_payload_stays_text() {
        let text = format!("{}1{}", "[".repeat(10_000), "]".repeat(10_000));
        assert_eq!(
            normalize(&RawResponse::text(text.clone())),
            NormalizedValue::Text(text)
        );

        let mixed = format!("{}'x'{}", "[{'k': ".repeat(5_000), "}]".repeat(5_000));
        assert!(matches!(
            normalize(&RawResponse::tool_text(mixed)),
            NormalizedValue::Text(_)
        ));
    }
}

//! Server handoff blob embedded in the document for client hydration.

use crate::build::FutureConfig;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::error;

/// Router state handed to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffState<'a> {
    pub loader_data: &'a BTreeMap<String, Value>,
    pub action_data: Option<&'a BTreeMap<String, Value>>,
    /// Output of [`crate::errors::serialize_errors`].
    pub errors: Option<Value>,
}

/// Everything the client runtime needs to pick up where the server left off.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerHandoff<'a> {
    pub url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_css: Option<&'a str>,
    pub state: HandoffState<'a>,
    pub future: &'a FutureConfig,
}

/// Escape characters that could end a `<script>` element or break JS
/// string parsing when the JSON is inlined into HTML.
#[must_use]
pub fn escape_html(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '&' => escaped.push_str("\\u0026"),
            '>' => escaped.push_str("\\u003e"),
            '<' => escaped.push_str("\\u003c"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Serialize the handoff as HTML-safe JSON.
#[must_use]
pub fn create_server_handoff_string(handoff: &ServerHandoff<'_>) -> String {
    match serde_json::to_string(handoff) {
        Ok(json) => escape_html(&json),
        Err(e) => {
            error!(error = %e, url = %handoff.url, "Failed to serialize server handoff");
            "{}".to_string()
        }
    }
}

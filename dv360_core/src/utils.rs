use rmcp::model::{CallToolResult, IntoContents, RawContent};
use serde::Serialize;

use crate::error::ConnectorError;

pub fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(text.into().into_contents())
}

/// Failed tool call: still a normal result, flagged `is_error`.
pub fn error_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::error(text.into().into_contents())
}

/// Concatenated text blocks of a tool result.
pub fn result_text(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn pretty_json<T: Serialize>(value: &T) -> Result<String, ConnectorError> {
    serde_json::to_string_pretty(value).map_err(ConnectorError::SerdeJson)
}

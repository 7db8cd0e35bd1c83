// src/error.rs
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Resource not found")]
    ResourceNotFound,

    #[error("Tool not found")]
    ToolNotFound,

    #[error("Method not found")]
    MethodNotFound,

    #[error("Parse error")]
    ParseError,

    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<jsonwebtoken::errors::Error> for ConnectorError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        ConnectorError::Authentication(format!("JWT signing failed: {}", err))
    }
}

impl ConnectorError {
    pub fn code_str(&self) -> &'static str {
        match self {
            ConnectorError::InvalidParams(_) => "invalid_params",
            ConnectorError::Configuration(_) => "config_error",
            ConnectorError::Authentication(_) => "auth_failed",
            ConnectorError::Api { .. } => "upstream_error",
            ConnectorError::HttpRequest(_) => "upstream_error",
            ConnectorError::ResourceNotFound => "not_found",
            ConnectorError::ToolNotFound => "tool_not_found",
            ConnectorError::MethodNotFound => "method_not_found",
            ConnectorError::ParseError => "parse_error",
            ConnectorError::Timeout(_) => "timeout",
            _ => "internal_error",
        }
    }

    pub fn to_jsonrpc_error(&self) -> serde_json::Value {
        let (code, message) = match self {
            ConnectorError::ResourceNotFound => (-32602, "Resource not found".to_string()),
            ConnectorError::ToolNotFound => (-32602, "Tool not found".to_string()),
            ConnectorError::InvalidParams(msg) => (-32602, msg.to_string()),
            ConnectorError::MethodNotFound => (-32601, "Method not found".to_string()),
            ConnectorError::ParseError => (-32700, "Parse error".to_string()),
            ConnectorError::Other(msg) => (-32603, msg.to_string()),
            err => (-32603, err.to_string()),
        };

        json!({
            "code": code,
            "message": message,
            "data": { "kind": self.code_str() },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonrpc_codes_follow_error_kind() {
        let err = ConnectorError::InvalidParams("Missing required argument(s): advertiser_id".into());
        let value = err.to_jsonrpc_error();
        assert_eq!(value["code"], -32602);
        assert_eq!(value["data"]["kind"], "invalid_params");

        assert_eq!(ConnectorError::MethodNotFound.to_jsonrpc_error()["code"], -32601);
        assert_eq!(ConnectorError::ParseError.to_jsonrpc_error()["code"], -32700);
        let api = ConnectorError::Api {
            status: 403,
            message: "denied".into(),
        };
        assert_eq!(api.to_jsonrpc_error()["code"], -32603);
        assert_eq!(api.to_string(), "API error 403: denied");
    }
}

// src/lib.rs
pub mod config;
pub mod connectors;
pub mod error;
pub mod logging;
pub mod mcp_server;
pub mod oauth;
pub mod remote;
pub mod service;
pub mod transport;
pub mod utils;
pub mod worker_pool;

pub use rmcp::model::{
    Annotated, CallToolRequestParam, CallToolResult, Content, Implementation,
    InitializeRequestParam, InitializeResult, ListResourcesResult, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, RawContent, RawResource, ReadResourceRequestParam,
    ReadResourceResult, Resource, ResourceContents, ServerCapabilities, Tool,
};

pub use crate::config::{Config, CredentialMode, PollPolicy, ToolProfile};
pub use crate::connectors::dv360::Dv360Connector;
pub use crate::error::ConnectorError;
pub use crate::remote::{ApiRequest, ApiTransport, HttpMethod};
pub use crate::service::ApiService;

use async_trait::async_trait;

/// One MCP server's worth of tools and resources.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the unique name of the connector (acting as the MCP server name).
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    async fn capabilities(&self) -> ServerCapabilities;

    async fn initialize(
        &self,
        request: InitializeRequestParam,
    ) -> Result<InitializeResult, ConnectorError>;
    async fn list_resources(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListResourcesResult, ConnectorError>;
    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
    ) -> Result<ReadResourceResult, ConnectorError>;
    async fn list_tools(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError>;

    /// Tool failures come back as results flagged `is_error`, not as `Err`.
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError>;
}

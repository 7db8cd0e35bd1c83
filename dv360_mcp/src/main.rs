use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dv360_core::{
    mcp_server::{JsonRpcHandler, McpServer},
    transport::StdioTransport,
    Config, Dv360Connector,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("dv360_mcp: invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    // stdout carries the protocol; logs go to stderr only.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!(
        api_version = %config.api_version,
        profile = ?config.tool_profile,
        "Starting DV360 MCP Server"
    );

    if !config.validate() {
        warn!(
            mode = config.credential_mode().as_str(),
            "No usable Google credentials configured; tool calls will report the problem"
        );
    }

    let connector = Dv360Connector::with_http(Arc::new(config))?;
    let handler = JsonRpcHandler::new(McpServer::new(Arc::new(connector)));
    let transport = StdioTransport::new(handler);

    info!("MCP Server ready, listening on stdio");

    tokio::select! {
        result = transport.run() => {
            if let Err(e) = result {
                error!("Transport error: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}

use serde_json::Value;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::mcp_server::JsonRpcHandler;

/// Stdio transport for MCP server.
///
/// Every request runs on its own task, so a slow tool call does not hold
/// up `ping` or other requests. Responses go through one writer task and
/// may arrive out of request order; clients match them by id.
pub struct StdioTransport {
    handler: Arc<JsonRpcHandler>,
}

impl StdioTransport {
    pub fn new(handler: JsonRpcHandler) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Serve newline-delimited JSON-RPC until stdin closes.
    pub async fn run(&self) -> io::Result<()> {
        info!("Starting stdio transport");
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await?;
        info!("Stdio transport finished");
        Ok(())
    }

    /// Serve requests from `reader` until EOF, writing responses to `writer`.
    ///
    /// Returns once every in-flight request has been answered.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();

        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(response) = rx.recv().await {
                if let Err(e) = write_response(&mut writer, &response).await {
                    error!("Failed to write response: {}", e);
                    return Err(e);
                }
            }
            Ok(())
        });

        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let handler = Arc::clone(&self.handler);
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        if let Some(response) = respond(&handler, &line).await {
                            // The writer only stops after a write error.
                            let _ = tx.send(response);
                        }
                    });
                }
                Ok(None) => {
                    debug!("EOF reached on input");
                    break;
                }
                Err(e) => {
                    error!("Error reading input: {}", e);
                    break;
                }
            }
        }

        // Request tasks hold their own senders; the writer drains until the last one ends.
        drop(tx);
        writer_task.await.map_err(io::Error::other)?
    }

    /// Response for one input line, if the message calls for one.
    pub async fn process_line(&self, line: &str) -> Option<Value> {
        respond(&self.handler, line).await
    }
}

async fn respond(handler: &JsonRpcHandler, line: &str) -> Option<Value> {
    debug!("Processing line: {}", line);

    match serde_json::from_str::<Value>(line) {
        Ok(request) => handler.handle_request(request).await,
        Err(e) => {
            error!("Failed to parse JSON-RPC request: {}", e);
            Some(serde_json::json!({
                "jsonrpc": "2.0",
                "error": {
                    "code": -32700,
                    "message": "Parse error",
                    "data": e.to_string()
                },
                "id": null
            }))
        }
    }
}

async fn write_response<W>(out: &mut W, response: &Value) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response_str = serde_json::to_string(response)?;
    out.write_all(response_str.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    debug!("Sent response: {}", response_str);
    Ok(())
}

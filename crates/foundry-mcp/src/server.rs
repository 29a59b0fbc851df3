//! MCP server over newline-delimited stdio
//!
//! Each line on stdin is one JSON-RPC message. Requests are handled
//! concurrently, so a slow `tools/call` does not hold up a `ping`; responses
//! are funnelled through a single writer task and may therefore arrive out
//! of order. Nothing but protocol messages is ever written to stdout.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, info, warn};

use crate::dispatch::ToolDispatcher;
use crate::error::{ServerError, ServerResult};
use crate::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::tools::tool_definitions;

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "foundry-mcp";

/// Protocol revisions this server answers with, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Longest accepted input line; uploads carry base64 payloads.
pub const MAX_LINE_LENGTH: usize = 64 * 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    protocol_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// The protocol front end.
#[derive(Debug)]
pub struct McpServer {
    dispatcher: ToolDispatcher,
    instructions: Option<String>,
}

impl McpServer {
    /// Server routing tool calls through `dispatcher`.
    pub fn new(dispatcher: ToolDispatcher) -> Self {
        Self {
            dispatcher,
            instructions: None,
        }
    }

    /// Text advertised as `instructions` in the `initialize` result.
    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions.filter(|text| !text.trim().is_empty());
        self
    }

    /// The tool dispatcher.
    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Handles one input line; `None` when no response is due.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                return Some(JsonRpcResponse::error(Value::Null, JsonRpcError::parse_error(e)));
            }
        };

        // Replies from the client to requests we never send.
        if value.get("method").is_none() && (value.get("result").is_some() || value.get("error").is_some()) {
            debug!("Ignoring response message");
            return None;
        }

        let id = value.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => Some(JsonRpcResponse::error(id, JsonRpcError::invalid_request(e))),
        }
    }

    /// Handles one decoded message.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            debug!(method = %request.method, "Notification");
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);
        let outcome = match request.method.as_str() {
            "initialize" => Ok(self.initialize(request.params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tool_definitions() })),
            "tools/call" => self.call_tool(request.params).await,
            other => {
                debug!(method = other, "Unknown method");
                return Some(JsonRpcResponse::error(id, JsonRpcError::method_not_found(other)));
            }
        };
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, JsonRpcError::from(&error)),
        })
    }

    fn initialize(&self, params: Option<Value>) -> Value {
        let requested = params
            .and_then(|p| serde_json::from_value::<InitializeParams>(p).ok())
            .and_then(|p| p.protocol_version);
        let version = requested
            .as_deref()
            .and_then(|v| SUPPORTED_PROTOCOL_VERSIONS.iter().find(|s| **s == v))
            .copied()
            .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]);

        let mut result = json!({
            "protocolVersion": version,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        if let (Some(instructions), Some(object)) = (&self.instructions, result.as_object_mut()) {
            object.insert("instructions".into(), Value::String(instructions.clone()));
        }
        result
    }

    async fn call_tool(&self, params: Option<Value>) -> ServerResult<Value> {
        let params: CallToolParams = params
            .ok_or_else(|| ServerError::InvalidParams("missing tool call parameters".into()))
            .and_then(|p| serde_json::from_value(p).map_err(|e| ServerError::InvalidParams(e.to_string())))?;
        let result = self.dispatcher.call(&params.name, params.arguments).await?;
        Ok(serde_json::to_value(result)?)
    }

    /// Serves until `reader` reaches end of input, then waits for in-flight
    /// requests to answer.
    ///
    /// # Errors
    ///
    /// Read, framing and write failures of the channel itself.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> ServerResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        let mut sink = FramedWrite::new(writer, LinesCodec::new());
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let writer_task = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                sink.send(line).await?;
            }
            Ok::<_, ServerError>(())
        });

        while let Some(line) = lines.next().await {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let server = Arc::clone(&self);
            let tx = tx.clone();
            tokio::spawn(async move {
                let Some(response) = server.handle_line(&line).await else {
                    return;
                };
                match serde_json::to_string(&response) {
                    Ok(text) => {
                        let _ = tx.send(text);
                    }
                    Err(e) => warn!("Failed to encode response: {e}"),
                }
            });
        }

        info!("Input closed, draining pending responses");
        drop(tx);
        writer_task
            .await
            .map_err(|e| ServerError::Task(e.to_string()))?
    }

    /// [`serve`](Self::serve) over the process stdin and stdout.
    ///
    /// # Errors
    ///
    /// See [`serve`](Self::serve).
    pub async fn serve_stdio(self: Arc<Self>) -> ServerResult<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }
}

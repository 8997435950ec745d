//! MCP server over stdio
//!
//! JSON-RPC 2.0, one message per line. Requests without an id are
//! notifications and get no reply.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::tools::{builtin_tools, execute_tool, ToolCall, ToolContext};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpResponse {
    fn result(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(McpError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// Tool definition in the shape MCP clients expect
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

pub struct McpServer {
    name: String,
    version: String,
    ctx: ToolContext,
}

impl McpServer {
    pub fn new(ctx: ToolContext) -> Self {
        Self {
            name: crate::NAME.to_string(),
            version: crate::VERSION.to_string(),
            ctx,
        }
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        builtin_tools()
            .into_iter()
            .map(|tool| ToolDefinition {
                name: tool.name,
                description: tool.description,
                input_schema: tool.parameters,
            })
            .collect()
    }

    /// Serve stdin/stdout until the client disconnects
    pub async fn run_stdio(&self) -> Result<()> {
        info!("{} {} serving MCP on stdio", self.name, self.version);
        let reader = BufReader::new(tokio::io::stdin());
        self.serve(reader, tokio::io::stdout()).await
    }

    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                debug!("Client disconnected");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<McpRequest>(trimmed) {
                Ok(request) => self.handle_message(request).await,
                Err(e) => Some(McpResponse::error(None, PARSE_ERROR, format!("Parse error: {}", e))),
            };

            if let Some(response) = response {
                let mut out = serde_json::to_string(&response)?;
                out.push('\n');
                writer.write_all(out.as_bytes()).await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle one message; notifications yield `None`
    pub async fn handle_message(&self, request: McpRequest) -> Option<McpResponse> {
        if request.id.is_none() {
            debug!("Notification: {}", request.method);
            return None;
        }
        Some(self.handle_request(request).await)
    }

    pub async fn handle_request(&self, request: McpRequest) -> McpResponse {
        debug!("Request: {}", request.method);
        let id = request.id;
        match request.method.as_str() {
            "initialize" => McpResponse::result(id, self.initialize_result()),
            "tools/list" => McpResponse::result(id, json!({ "tools": self.tool_definitions() })),
            "tools/call" => self.handle_tools_call(id, &request.params).await,
            "ping" => McpResponse::result(id, json!({})),
            other => McpResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
        }
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": self.name,
                "version": self.version
            }
        })
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: &Value) -> McpResponse {
        let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
            return McpResponse::error(id, INVALID_PARAMS, "Missing tool name");
        };
        if !builtin_tools().iter().any(|t| t.name == name) {
            return McpResponse::error(id, INVALID_PARAMS, format!("Unknown tool: {}", name));
        }

        let call = ToolCall {
            name: name.to_string(),
            arguments: params.get("arguments").cloned().unwrap_or_else(|| json!({})),
        };

        match execute_tool(&call, &self.ctx).await {
            Ok(result) => McpResponse::result(
                id,
                json!({
                    "content": [{ "type": "text", "text": result.message }],
                    "isError": !result.success
                }),
            ),
            Err(e) => McpResponse::error(id, INTERNAL_ERROR, e.to_string()),
        }
    }
}

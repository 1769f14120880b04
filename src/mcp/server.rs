use serde_json::Value;
use tracing::{debug, error, info};

use super::{
    notification_tools::*, render_tools::*, tools::{ToolContext, ToolRegistry}, types::*,
    MCP_PROTOCOL_VERSION,
};
use crate::error::AppError;

pub struct McpServer {
    pub tools: ToolRegistry,
}

impl Default for McpServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Macro to register multiple tools at once
macro_rules! register_tools {
    ($registry:expr, $($tool:expr),+ $(,)?) => {
        $(
            $registry.register($tool);
        )+
    };
}

impl McpServer {
    pub fn new() -> Self {
        let mut tools = ToolRegistry::new();

        register_tools!(
            tools,
            // Rendering tools
            RenderContentTool,
            ReadRenderedContentTool,
            InjectScriptTool,
            // Notification stream tools
            StartNotificationStreamTool,
            CancelNotificationStreamsTool,
        );

        Self { tools }
    }

    pub async fn handle_request(
        &self,
        ctx: &ToolContext<'_>,
        request: JsonRpcRequest,
    ) -> JsonRpcResponse {
        debug!("Handling MCP request: {}", request.method);

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "notifications/initialized" => self.handle_initialized().await,
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(ctx, request.params).await,
            "ping" => Ok(serde_json::json!({})),
            _ => Err(JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Method '{}' not found", request.method),
                data: None,
            }),
        };

        match response {
            Ok(result) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: Some(result),
                error: None,
            },
            Err(error) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: None,
                error: Some(error),
            },
        }
    }

    async fn handle_initialize(
        &self,
        params: Option<Value>,
    ) -> std::result::Result<Value, JsonRpcError> {
        info!("Handling initialize request");

        let request: InitializeRequest = match params {
            Some(params) => serde_json::from_value(params).map_err(|e| JsonRpcError {
                code: INVALID_PARAMS,
                message: format!("Invalid initialize params: {}", e),
                data: None,
            })?,
            None => {
                return Err(JsonRpcError {
                    code: INVALID_PARAMS,
                    message: "Missing initialize parameters".to_string(),
                    data: None,
                })
            }
        };

        let client_version = &request.protocol_version;
        if client_version != MCP_PROTOCOL_VERSION {
            info!(
                "Protocol version mismatch: client requested {}, negotiating down to {}",
                client_version, MCP_PROTOCOL_VERSION
            );
        }

        let response = InitializeResponse {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
                logging: LoggingCapability::default(),
            },
            server_info: ServerInfo {
                name: "viewport-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        serde_json::to_value(response).map_err(|e| JsonRpcError {
            code: INTERNAL_ERROR,
            message: format!("Failed to serialize response: {}", e),
            data: None,
        })
    }

    async fn handle_initialized(&self) -> std::result::Result<Value, JsonRpcError> {
        info!("Handling notifications/initialized request");

        // Acknowledged with an empty result; the MCP spec requires no reply.
        Ok(Value::Null)
    }

    async fn handle_list_tools(&self) -> std::result::Result<Value, JsonRpcError> {
        info!("Handling list_tools request");

        let response = ListToolsResponse {
            tools: self.tools.list_tools(),
        };

        serde_json::to_value(response).map_err(|e| JsonRpcError {
            code: INTERNAL_ERROR,
            message: format!("Failed to serialize tools: {}", e),
            data: None,
        })
    }

    async fn handle_call_tool(
        &self,
        ctx: &ToolContext<'_>,
        params: Option<Value>,
    ) -> std::result::Result<Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(params) => serde_json::from_value(params).map_err(|e| JsonRpcError {
                code: INVALID_PARAMS,
                message: format!("Invalid call_tool params: {}", e),
                data: None,
            })?,
            None => {
                return Err(JsonRpcError {
                    code: INVALID_PARAMS,
                    message: "Missing call_tool parameters".to_string(),
                    data: None,
                })
            }
        };

        info!("Calling tool: {}", request.name);

        if let Some(ref args) = request.arguments {
            let should_log = match args {
                Value::Null => false,
                Value::Object(map) => !map.is_empty(),
                _ => true,
            };
            if should_log {
                debug!(
                    "Tool parameters: {}",
                    serde_json::to_string_pretty(args)
                        .unwrap_or_else(|_| "Failed to serialize parameters".to_string())
                );
            }
        }

        let response = self.tools.dispatch(ctx, request).await.map_err(|e| {
            error!("Tool execution error: {}", e);
            JsonRpcError {
                code: error_code_for(&e),
                message: e.to_string(),
                data: None,
            }
        })?;

        serde_json::to_value(response).map_err(|e| JsonRpcError {
            code: INTERNAL_ERROR,
            message: format!("Failed to serialize tool response: {}", e),
            data: None,
        })
    }
}

/// Map the error taxonomy onto JSON-RPC codes, keeping the human-readable
/// text intact for the calling agent.
fn error_code_for(error: &AppError) -> i32 {
    match error {
        AppError::UnknownTool { .. } => METHOD_NOT_FOUND,
        AppError::Validation(_) | AppError::Json(_) => INVALID_PARAMS,
        _ => INTERNAL_ERROR,
    }
}

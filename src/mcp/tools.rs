use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::{timeout, Duration, Instant};
use tracing::{error, info, warn};

use super::types::{CallToolRequest, CallToolResponse, Tool, ToolContent};
use crate::{
    error::{AppError, Result},
    server::AppState,
    session::SessionTransport,
};

/// Everything a tool invocation may touch: shared state plus the session
/// whose side channel carried the call.
pub struct ToolContext<'a> {
    pub state: &'a AppState,
    pub session: &'a Arc<SessionTransport>,
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: &ToolContext<'_>, arguments: Option<Value>)
        -> Result<CallToolResponse>;

    fn definition(&self) -> Tool;

    /// Optional startup hook; a failure aborts registry startup.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Optional teardown hook; failures are logged and do not stop the
    /// remaining cleanups.
    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn ToolHandler>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool under its declared name. Registration happens once
    /// at process start; a nameless tool is a programming error. Duplicate
    /// names are overwritten loudly, last registration wins.
    pub fn register<T: ToolHandler + 'static>(&mut self, tool: T) {
        let name = tool.definition().name;
        assert!(!name.is_empty(), "tool registered without a name");
        if self.tools.contains_key(&name) {
            warn!("Tool '{}' registered twice; last registration wins", name);
        }
        self.tools.insert(name, Box::new(tool));
    }

    pub fn get_tool(&self, name: &str) -> Option<&dyn ToolHandler> {
        self.tools.get(name).map(|tool| tool.as_ref())
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn list_tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.tools.values().map(|tool| tool.definition()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Validate and execute a tool call. Duration is logged regardless of
    /// outcome; handler failures are wrapped with the tool name attached.
    pub async fn dispatch(
        &self,
        ctx: &ToolContext<'_>,
        request: CallToolRequest,
    ) -> Result<CallToolResponse> {
        let name = request.name.clone();
        let started = Instant::now();
        let result = self.dispatch_inner(ctx, &name, request.arguments).await;
        let elapsed_ms = started.elapsed().as_millis();
        match &result {
            Ok(_) => info!("Tool '{}' completed in {}ms", name, elapsed_ms),
            Err(e) => warn!("Tool '{}' failed in {}ms: {}", name, elapsed_ms, e),
        }
        result
    }

    async fn dispatch_inner(
        &self,
        ctx: &ToolContext<'_>,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<CallToolResponse> {
        let tool = self.get_tool(name).ok_or_else(|| AppError::UnknownTool {
            name: name.to_string(),
            available: self.tool_names().join(", "),
        })?;

        validate_required(&tool.definition(), &arguments)?;

        let deadline = Duration::from_secs(ctx.state.config.tool_timeout_secs);
        match timeout(deadline, tool.call(ctx, arguments)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(AppError::tool_execution(name, e)),
            Err(_) => Err(AppError::ToolExecution {
                tool: name.to_string(),
                message: format!("timed out after {}s", ctx.state.config.tool_timeout_secs),
            }),
        }
    }

    /// Run every tool's initialize hook. The first failure aborts startup.
    pub async fn initialize_all(&self) -> Result<()> {
        for (name, tool) in &self.tools {
            if let Err(e) = tool.initialize().await {
                error!("Tool '{}' failed to initialize: {}", name, e);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run every tool's cleanup hook, best effort.
    pub async fn cleanup_all(&self) {
        for (name, tool) in &self.tools {
            if let Err(e) = tool.cleanup().await {
                warn!("Tool '{}' cleanup failed: {}", name, e);
            }
        }
    }
}

/// Baseline schema contract: every key in the tool's `required` array must
/// be present in the arguments object.
fn validate_required(tool: &Tool, arguments: &Option<Value>) -> Result<()> {
    let required = match tool.input_schema.get("required").and_then(|v| v.as_array()) {
        Some(required) if !required.is_empty() => required,
        _ => return Ok(()),
    };

    let args = match arguments {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    };

    for key in required.iter().filter_map(|k| k.as_str()) {
        let present = args.map(|map| map.contains_key(key)).unwrap_or(false);
        if !present {
            return Err(AppError::Validation(format!(
                "missing required parameter '{}' for tool '{}'",
                key, tool.name
            )));
        }
    }
    Ok(())
}

pub fn create_success_response(message: &str) -> CallToolResponse {
    CallToolResponse {
        content: vec![ToolContent {
            content_type: "text".to_string(),
            text: message.to_string(),
        }],
        is_error: None,
    }
}

pub fn create_error_response(error: &str) -> CallToolResponse {
    CallToolResponse {
        content: vec![ToolContent {
            content_type: "text".to_string(),
            text: error.to_string(),
        }],
        is_error: Some(true),
    }
}

pub fn create_json_success_response(value: Value) -> CallToolResponse {
    let text = serde_json::to_string_pretty(&value)
        .unwrap_or_else(|_| "Failed to serialize response".to_string());
    create_success_response(&text)
}

// Utility function to extract and validate parameters
pub fn extract_param<T>(arguments: &Option<Value>, key: &str) -> Result<T>
where
    T: for<'de> serde::Deserialize<'de>,
{
    match arguments {
        Some(Value::Object(map)) => match map.get(key) {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                AppError::Validation(format!("Invalid parameter '{}': {}", key, e))
            }),
            None => Err(AppError::Validation(format!(
                "Missing required parameter '{}'",
                key
            ))),
        },
        _ => Err(AppError::Validation(
            "Arguments must be an object".to_string(),
        )),
    }
}

pub fn extract_optional_param<T>(arguments: &Option<Value>, key: &str) -> Result<Option<T>>
where
    T: for<'de> serde::Deserialize<'de>,
{
    match arguments {
        Some(Value::Object(map)) => match map.get(key) {
            Some(value) if !value.is_null() => {
                let parsed: T = serde_json::from_value(value.clone()).map_err(|e| {
                    AppError::Validation(format!("Invalid parameter '{}': {}", key, e))
                })?;
                Ok(Some(parsed))
            }
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::AppState;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        async fn call(
            &self,
            _ctx: &ToolContext<'_>,
            arguments: Option<Value>,
        ) -> Result<CallToolResponse> {
            let text: String = extract_param(&arguments, "text")?;
            Ok(create_success_response(&text))
        }

        fn definition(&self) -> Tool {
            Tool {
                name: "echo".to_string(),
                description: "Echo the given text back".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "text": { "type": "string" }
                    },
                    "required": ["text"]
                }),
            }
        }
    }

    struct FailingTool;

    #[async_trait]
    impl ToolHandler for FailingTool {
        async fn call(
            &self,
            _ctx: &ToolContext<'_>,
            _arguments: Option<Value>,
        ) -> Result<CallToolResponse> {
            Err(AppError::ContentResolution("boom".to_string()))
        }

        fn definition(&self) -> Tool {
            Tool {
                name: "failing".to_string(),
                description: "Always fails".to_string(),
                input_schema: json!({ "type": "object", "properties": {}, "required": [] }),
            }
        }

        async fn initialize(&self) -> Result<()> {
            Err(AppError::Environment("cannot start".to_string()))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(FailingTool);
        registry
    }

    async fn with_context<F, Fut, T>(f: F) -> T
    where
        F: FnOnce(AppState, Arc<SessionTransport>) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let state = AppState::for_tests();
        let (session, _rx) = SessionTransport::connect();
        session.start().unwrap();
        f(state, session).await
    }

    #[tokio::test]
    async fn dispatch_returns_the_handler_result_unchanged() {
        with_context(|state, session| async move {
            let ctx = ToolContext {
                state: &state,
                session: &session,
            };
            let response = registry()
                .dispatch(
                    &ctx,
                    CallToolRequest {
                        name: "echo".to_string(),
                        arguments: Some(json!({"text": "hello"})),
                    },
                )
                .await
                .unwrap();
            assert_eq!(response.content[0].text, "hello");
        })
        .await;
    }

    #[tokio::test]
    async fn unknown_tool_error_names_the_tool() {
        with_context(|state, session| async move {
            let ctx = ToolContext {
                state: &state,
                session: &session,
            };
            let err = registry()
                .dispatch(
                    &ctx,
                    CallToolRequest {
                        name: "nope".to_string(),
                        arguments: None,
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::UnknownTool { .. }));
            assert!(err.to_string().contains("nope"));
            assert!(err.to_string().contains("echo"));
        })
        .await;
    }

    #[tokio::test]
    async fn missing_required_field_fails_validation() {
        with_context(|state, session| async move {
            let ctx = ToolContext {
                state: &state,
                session: &session,
            };
            let err = registry()
                .dispatch(
                    &ctx,
                    CallToolRequest {
                        name: "echo".to_string(),
                        arguments: Some(json!({})),
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
            assert!(err.to_string().contains("text"));
        })
        .await;
    }

    #[tokio::test]
    async fn handler_failure_is_wrapped_with_the_tool_name() {
        with_context(|state, session| async move {
            let ctx = ToolContext {
                state: &state,
                session: &session,
            };
            let err = registry()
                .dispatch(
                    &ctx,
                    CallToolRequest {
                        name: "failing".to_string(),
                        arguments: None,
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::ToolExecution { .. }));
            assert!(err.to_string().contains("failing"));
            assert!(err.to_string().contains("boom"));
        })
        .await;
    }

    #[tokio::test]
    async fn initialize_all_fails_fast() {
        let registry = registry();
        assert!(registry.initialize_all().await.is_err());
        // best-effort teardown must not panic or abort
        registry.cleanup_all().await;
    }

    #[test]
    fn duplicate_registration_is_loud_but_last_wins() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(EchoTool);
        assert_eq!(registry.tool_names(), vec!["echo".to_string()]);
    }
}

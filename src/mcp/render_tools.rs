use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::tools::{
    create_error_response, create_json_success_response, extract_optional_param, extract_param,
    ToolContext, ToolHandler,
};
use super::types::{CallToolResponse, Tool};
use crate::{
    content::ContentKind,
    error::Result,
    surface::{InjectConfig, WindowConfig},
};

pub struct RenderContentTool;

#[async_trait]
impl ToolHandler for RenderContentTool {
    async fn call(
        &self,
        ctx: &ToolContext<'_>,
        arguments: Option<Value>,
    ) -> Result<CallToolResponse> {
        let type_str: String = extract_param(&arguments, "type")?;
        let content: String = extract_param(&arguments, "content")?;
        let title: Option<String> = extract_optional_param(&arguments, "title")?;
        let width: Option<u32> = extract_optional_param(&arguments, "width")?;
        let height: Option<u32> = extract_optional_param(&arguments, "height")?;

        let kind: ContentKind = type_str.parse()?;
        debug!("Rendering content spec: type={}, {} chars", kind, content.len());

        let resolved = ctx.state.resolver.resolve(kind, &content).await?;
        let title = title.unwrap_or_else(|| format!("Rendered {}", resolved.kind));

        let window_config = if let Some(ref url) = resolved.direct_url {
            WindowConfig {
                title: Some(title.clone()),
                url: Some(url.clone()),
                width,
                height,
                ..Default::default()
            }
        } else {
            let html = resolved.html.clone().unwrap_or_default();
            ctx.state.render_cache.store(&title, &html).await;
            WindowConfig {
                title: Some(title.clone()),
                html: Some(html),
                width,
                height,
                ..Default::default()
            }
        };

        let window = ctx.state.surface.create_window(window_config).await?;
        info!("Rendered content as '{}' ({})", title, resolved.kind);

        Ok(create_json_success_response(json!({
            "rendered": true,
            "title": title,
            "resolvedType": resolved.kind,
            "subType": resolved.sub_type,
            "directUrl": resolved.direct_url,
            "window": window,
        })))
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "render-content".to_string(),
            description: "Resolve a content spec (html, url, markdown, image or auto) into a \
                          document and display it in a host window"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "type": {
                        "type": "string",
                        "enum": ["html", "url", "markdown", "image", "auto"],
                        "description": "Content type; 'auto' asks the classifier to detect it"
                    },
                    "content": {
                        "type": "string",
                        "description": "Raw HTML, a URL or file path, Markdown text, or image data"
                    },
                    "title": {
                        "type": "string",
                        "description": "Optional window title"
                    },
                    "width": {
                        "type": "integer",
                        "description": "Optional window width in pixels"
                    },
                    "height": {
                        "type": "integer",
                        "description": "Optional window height in pixels"
                    }
                },
                "required": ["type", "content"]
            }),
        }
    }
}

pub struct ReadRenderedContentTool;

#[async_trait]
impl ToolHandler for ReadRenderedContentTool {
    async fn call(
        &self,
        ctx: &ToolContext<'_>,
        arguments: Option<Value>,
    ) -> Result<CallToolResponse> {
        let format: Option<String> = extract_optional_param(&arguments, "format")?;
        let format = format.unwrap_or_else(|| "markdown".to_string());

        let cached = match ctx.state.render_cache.get().await {
            Some(cached) => cached,
            None => {
                return Ok(create_error_response(
                    "No content has been rendered yet. Call render-content first.",
                ))
            }
        };

        let body = match format.as_str() {
            "markdown" => cached.markdown,
            "html" => cached.html,
            other => {
                return Ok(create_error_response(&format!(
                    "Unknown format '{}'; expected 'markdown' or 'html'",
                    other
                )))
            }
        };

        Ok(create_json_success_response(json!({
            "title": cached.title,
            "format": format,
            "renderedAt": cached.rendered_at.to_rfc3339(),
            "content": body,
        })))
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "read-rendered-content".to_string(),
            description: "Read back the most recently rendered document as markdown or html"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "format": {
                        "type": "string",
                        "enum": ["markdown", "html"],
                        "description": "Output format, defaults to markdown"
                    }
                },
                "required": []
            }),
        }
    }
}

pub struct InjectScriptTool;

#[async_trait]
impl ToolHandler for InjectScriptTool {
    async fn call(
        &self,
        ctx: &ToolContext<'_>,
        arguments: Option<Value>,
    ) -> Result<CallToolResponse> {
        let code: String = extract_param(&arguments, "code")?;
        debug!("Injecting {} chars of script into the active window", code.len());

        let result = ctx.state.surface.inject_js(InjectConfig { code }).await?;

        Ok(create_json_success_response(json!({
            "injected": true,
            "result": result,
        })))
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "inject-script".to_string(),
            description: "Run JavaScript inside the most recently created host window".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "JavaScript source to execute"
                    }
                },
                "required": ["code"]
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::AppError,
        mcp::types::CallToolRequest,
        server::AppState,
        session::SessionTransport,
        surface::NullSurface,
    };
    use std::sync::Arc;

    async fn dispatch(state: &AppState, name: &str, arguments: Value) -> Result<CallToolResponse> {
        let (session, _rx) = SessionTransport::connect();
        session.start().unwrap();
        let ctx = ToolContext {
            state,
            session: &session,
        };
        state
            .mcp_server
            .tools
            .dispatch(
                &ctx,
                CallToolRequest {
                    name: name.to_string(),
                    arguments: Some(arguments),
                },
            )
            .await
    }

    #[tokio::test]
    async fn render_then_read_back_round_trips_through_the_cache() {
        let state = AppState::for_tests_with_surface(Arc::new(NullSurface));

        let response = dispatch(
            &state,
            "render-content",
            json!({"type": "html", "content": "<h1>Report</h1>", "title": "Report"}),
        )
        .await
        .unwrap();
        assert!(response.content[0].text.contains("\"rendered\": true"));

        let read = dispatch(&state, "read-rendered-content", json!({}))
            .await
            .unwrap();
        assert!(read.content[0].text.contains("# Report"));
        assert_eq!(read.is_error, None);
    }

    #[tokio::test]
    async fn render_url_passes_through_without_caching() {
        let state = AppState::for_tests_with_surface(Arc::new(NullSurface));

        let response = dispatch(
            &state,
            "render-content",
            json!({"type": "url", "content": "https://example.com"}),
        )
        .await
        .unwrap();
        assert!(response.content[0].text.contains("https://example.com"));
        assert!(state.render_cache.get().await.is_none());
    }

    #[tokio::test]
    async fn read_back_without_a_render_is_a_soft_error() {
        let state = AppState::for_tests_with_surface(Arc::new(NullSurface));
        let read = dispatch(&state, "read-rendered-content", json!({}))
            .await
            .unwrap();
        assert_eq!(read.is_error, Some(true));
        assert!(read.content[0].text.contains("render-content"));
    }

    #[tokio::test]
    async fn detached_surface_surfaces_environment_guidance() {
        let state = AppState::for_tests();
        let err = dispatch(
            &state,
            "render-content",
            json!({"type": "html", "content": "<p>x</p>"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::ToolExecution { .. }));
        assert!(err.to_string().contains("display host"));
    }

    #[tokio::test]
    async fn invalid_content_type_is_a_validation_failure() {
        let state = AppState::for_tests_with_surface(Arc::new(NullSurface));
        let err = dispatch(
            &state,
            "render-content",
            json!({"type": "pdf", "content": "x"}),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("invalid content type"));
    }

    #[tokio::test]
    async fn inject_script_requires_code() {
        let state = AppState::for_tests_with_surface(Arc::new(NullSurface));
        let err = dispatch(&state, "inject-script", json!({})).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}

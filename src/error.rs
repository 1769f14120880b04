use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown tool '{name}'. Available tools: {available}")]
    UnknownTool { name: String, available: String },

    #[error("Session '{0}' not found")]
    SessionNotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Content resolution error: {0}")]
    ContentResolution(String),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Environment error: {0}")]
    Environment(String),

    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Wrap a handler failure with the name of the tool that produced it,
    /// preserving the original message text for the caller.
    pub fn tool_execution(tool: &str, source: AppError) -> Self {
        AppError::ToolExecution {
            tool: tool.to_string(),
            message: source.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Validation(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::UnknownTool { .. } | AppError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::ContentResolution(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Environment(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Transport(_)
            | AppError::Classifier(_)
            | AppError::ToolExecution { .. }
            | AppError::Io(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = json!({
            "error": self.to_string()
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tool_message_names_the_tool_and_alternatives() {
        let err = AppError::UnknownTool {
            name: "render-contnet".to_string(),
            available: "render-content, inject-script".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("render-contnet"));
        assert!(text.contains("render-content"));
    }

    #[test]
    fn tool_execution_wraps_original_message() {
        let inner = AppError::ContentResolution("file not found: /tmp/nope.html".to_string());
        let err = AppError::tool_execution("render-content", inner);
        let text = err.to_string();
        assert!(text.contains("render-content"));
        assert!(text.contains("file not found"));
    }
}

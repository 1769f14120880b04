use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::tools::{
    create_json_success_response, extract_optional_param, extract_param, ToolContext, ToolHandler,
};
use super::types::{CallToolResponse, Tool};
use crate::{
    error::{AppError, Result},
    notify::{run_stream, NotificationLevel, StreamParams},
};

pub struct StartNotificationStreamTool;

#[async_trait]
impl ToolHandler for StartNotificationStreamTool {
    async fn call(
        &self,
        ctx: &ToolContext<'_>,
        arguments: Option<Value>,
    ) -> Result<CallToolResponse> {
        let interval_ms: u64 = extract_param(&arguments, "intervalMs")?;
        let count: u32 = extract_param(&arguments, "count")?;
        let message: Option<String> = extract_optional_param(&arguments, "message")?;
        let level: Option<String> = extract_optional_param(&arguments, "level")?;

        if interval_ms == 0 {
            return Err(AppError::Validation(
                "intervalMs must be at least 1".to_string(),
            ));
        }
        if count == 0 {
            return Err(AppError::Validation("count must be at least 1".to_string()));
        }
        let level = match level {
            Some(raw) => NotificationLevel::parse(&raw).ok_or_else(|| {
                AppError::Validation(format!(
                    "invalid level '{}' (expected debug, info, warning or error)",
                    raw
                ))
            })?,
            None => NotificationLevel::Info,
        };

        let params = StreamParams {
            interval_ms,
            count,
            template: message
                .unwrap_or_else(|| "Notification {counter} at {timestamp}".to_string()),
            level,
        };

        let session_id = ctx.session.id().unwrap_or("").to_string();
        let jobs = ctx.state.jobs.clone();
        let job_id = jobs.create(&session_id, &params);
        let transport = Arc::clone(ctx.session);

        // The stream outlives this call; the loop pushes messages until the
        // count is exhausted, the job is cancelled, or the session closes.
        let spawned_job_id = job_id.clone();
        tokio::spawn(async move {
            let outcome = run_stream(jobs, transport, spawned_job_id, params).await;
            info!(
                "Notification stream {} completed: {} of {} sent",
                outcome.job_id,
                outcome.total_sent,
                outcome.results.len()
            );
        });

        Ok(create_json_success_response(json!({
            "started": true,
            "jobId": job_id,
            "intervalMs": interval_ms,
            "count": count,
            "level": level,
        })))
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "start-notification-stream".to_string(),
            description: "Start a timed stream of leveled notification messages pushed over \
                          this session. Supports {counter}, {timestamp}, {level} and \
                          {sessionId} placeholders in the message template"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "intervalMs": {
                        "type": "integer",
                        "description": "Delay between messages in milliseconds"
                    },
                    "count": {
                        "type": "integer",
                        "description": "Number of messages to send"
                    },
                    "message": {
                        "type": "string",
                        "description": "Message template, may contain placeholders"
                    },
                    "level": {
                        "type": "string",
                        "enum": ["debug", "info", "warning", "error"],
                        "description": "Notification level, defaults to info"
                    }
                },
                "required": ["intervalMs", "count"]
            }),
        }
    }
}

pub struct CancelNotificationStreamsTool;

#[async_trait]
impl ToolHandler for CancelNotificationStreamsTool {
    async fn call(
        &self,
        ctx: &ToolContext<'_>,
        _arguments: Option<Value>,
    ) -> Result<CallToolResponse> {
        let cancelled = ctx.state.jobs.cancel_all();
        Ok(create_json_success_response(json!({
            "cancelled": cancelled,
        })))
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "cancel-notification-streams".to_string(),
            description: "Cancel every running notification stream; each loop stops at its \
                          next interval check"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mcp::types::CallToolRequest, server::AppState, session::SessionTransport};
    use tokio::time::{timeout, Duration};

    async fn dispatch(
        state: &AppState,
        session: &Arc<crate::session::SessionTransport>,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResponse> {
        let ctx = ToolContext { state, session };
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
    async fn stream_tool_pushes_messages_over_the_session() {
        let state = AppState::for_tests();
        let (session, mut rx) = SessionTransport::connect();
        session.start().unwrap();

        let response = dispatch(
            &state,
            &session,
            "start-notification-stream",
            json!({"intervalMs": 10, "count": 2, "message": "tick {counter}"}),
        )
        .await
        .unwrap();
        assert!(response.content[0].text.contains("\"started\": true"));

        for expected in ["tick 1", "tick 2"] {
            let frame = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("notification within deadline")
                .expect("stream open");
            assert!(frame.data.contains(expected));
        }
    }

    #[tokio::test]
    async fn zero_interval_or_count_is_rejected() {
        let state = AppState::for_tests();
        let (session, _rx) = SessionTransport::connect();
        session.start().unwrap();

        let err = dispatch(
            &state,
            &session,
            "start-notification-stream",
            json!({"intervalMs": 0, "count": 3}),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("intervalMs"));

        let err = dispatch(
            &state,
            &session,
            "start-notification-stream",
            json!({"intervalMs": 10, "count": 0}),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("count"));
    }

    #[tokio::test]
    async fn cancel_tool_clears_active_jobs() {
        let state = AppState::for_tests();
        let (session, _rx) = SessionTransport::connect();
        session.start().unwrap();

        dispatch(
            &state,
            &session,
            "start-notification-stream",
            json!({"intervalMs": 60_000, "count": 100}),
        )
        .await
        .unwrap();
        assert_eq!(state.jobs.active_count(), 1);

        let response = dispatch(&state, &session, "cancel-notification-streams", json!({}))
            .await
            .unwrap();
        assert!(response.content[0].text.contains("\"cancelled\": 1"));
        assert_eq!(state.jobs.active_count(), 0);
    }
}

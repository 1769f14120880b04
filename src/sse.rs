//! HTTP framing for the session channel.
//!
//! `GET /mcp` opens the long-lived SSE push stream: the handshake assigns a
//! session id, registers the transport, and announces the correlated
//! message endpoint as the first event. `POST /messages?sessionId=` is the
//! inbound side channel; tool results travel back over the push stream,
//! the POST itself only acknowledges acceptance.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::Result,
    mcp::{
        constants::JsonRpcEnvelopes,
        tools::ToolContext,
        types::{INTERNAL_ERROR, PARSE_ERROR},
    },
    notify::NotificationJobs,
    server::AppState,
    session::{SessionRegistry, SessionTransport},
};

/// Deregisters a session when its SSE stream ends, whichever way it ends.
/// The registry's removal is idempotent, so racing an explicit close is
/// harmless.
struct StreamGuard {
    sessions: SessionRegistry,
    jobs: NotificationJobs,
    session_id: String,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let cancelled = self.jobs.cancel_for_session(&self.session_id);
        if cancelled > 0 {
            debug!(
                "Cancelled {} notification job(s) for ending session {}",
                cancelled, self.session_id
            );
        }
        self.sessions.remove(&self.session_id);
        info!("SSE session ended: {}", self.session_id);
    }
}

/// SSE endpoint handler: performs the handshake and becomes the outbound
/// channel for the new session.
pub async fn sse_handler(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    let (transport, mut outbound) = SessionTransport::connect();
    let session_id = transport.start()?;
    state.sessions.register(Arc::clone(&transport))?;
    info!("SSE session opened: {}", session_id);

    let endpoint = Config::messages_endpoint(&session_id);
    let guard = StreamGuard {
        sessions: state.sessions.clone(),
        jobs: state.jobs.clone(),
        session_id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;

        // Handshake completion: tell the client where its side channel is.
        yield Ok(Event::default().event("endpoint").data(endpoint));

        while let Some(frame) = outbound.recv().await {
            yield Ok(Event::default().event(frame.event).data(frame.data));
        }
        // Sender side closed: transport was shut down, guard drops here.
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    ))
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// HTTP POST endpoint for a session's correlated inbound messages. The
/// body is taken raw so framing errors can be answered on this channel
/// without touching the session.
pub async fn messages_handler(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
    body: String,
) -> Response {
    let session_id = match query.session_id {
        Some(id) if !id.is_empty() => id,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "missing_session_id",
                    "message": "the sessionId query parameter is required",
                    "example": "/messages?sessionId=<id>",
                })),
            )
                .into_response();
        }
    };

    let transport = match state.sessions.resolve(&session_id) {
        Ok(transport) => transport,
        Err(_) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": "session_not_found",
                    "message": format!("no active session with id '{}'", session_id),
                    "availableSessions": state.sessions.ids(),
                })),
            )
                .into_response();
        }
    };

    // Parse failures answer this channel and leave the session open.
    let request = match transport.handle_inbound(&body) {
        Ok(request) => request,
        Err(e) => {
            let id = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("id").cloned());
            let error = JsonRpcEnvelopes::error_response(PARSE_ERROR, &e.to_string(), id);
            return (StatusCode::BAD_REQUEST, Json(error)).into_response();
        }
    };

    debug!(
        "Inbound message for session {}: {}",
        session_id, request.method
    );
    let is_notification = request.is_notification();
    let ctx = ToolContext {
        state: &state,
        session: &transport,
    };
    let response = state.mcp_server.handle_request(&ctx, request).await;

    if is_notification {
        return accepted(&session_id);
    }

    // The result goes back over the push stream, not this response body.
    let response_value = match serde_json::to_value(&response) {
        Ok(value) => value,
        Err(e) => {
            let error = JsonRpcEnvelopes::error_response(
                INTERNAL_ERROR,
                &format!("Failed to serialize response: {}", e),
                response.id,
            );
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response();
        }
    };
    match transport.send(response_value) {
        Ok(()) => accepted(&session_id),
        Err(e) => {
            warn!(
                "Failed to push response for session {}: {}",
                session_id, e
            );
            e.into_response()
        }
    }
}

fn accepted(session_id: &str) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "sessionId": session_id,
        })),
    )
        .into_response()
}

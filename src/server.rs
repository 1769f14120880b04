use axum::{
    extract::State,
    http::{header, HeaderMap, Method},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    cache::RenderCache,
    config::Config,
    content::ContentResolver,
    error::Result,
    mcp::server::McpServer,
    notify::NotificationJobs,
    session::SessionRegistry,
    sse::{messages_handler, sse_handler},
    surface::HostSurface,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: SessionRegistry,
    pub mcp_server: Arc<McpServer>,
    pub jobs: NotificationJobs,
    pub surface: Arc<dyn HostSurface>,
    pub render_cache: RenderCache,
    pub resolver: Arc<ContentResolver>,
}

impl AppState {
    /// Wire up shared state. The host surface is injected here so that a
    /// missing collaborator is a construction-time decision, not a runtime
    /// surprise inside a handler.
    pub fn new(config: Config, surface: Arc<dyn HostSurface>) -> Self {
        let resolver = Arc::new(ContentResolver::new(&config));
        Self {
            config,
            sessions: SessionRegistry::new(),
            mcp_server: Arc::new(McpServer::new()),
            jobs: NotificationJobs::new(),
            surface,
            render_cache: RenderCache::new(),
            resolver,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::new(Config::default(), Arc::new(crate::surface::DetachedSurface))
    }

    #[cfg(test)]
    pub(crate) fn for_tests_with_surface(surface: Arc<dyn HostSurface>) -> Self {
        Self::new(Config::default(), surface)
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::CACHE_CONTROL,
            header::HeaderName::from_static("last-event-id"),
            header::HeaderName::from_static("mcp-protocol-version"),
        ])
        .allow_origin(header::HeaderValue::from_static("*"));

    Router::new()
        .route("/mcp", get(sse_handler))
        .route("/messages", post(messages_handler))
        .route("/health", get(health_check))
        .route("/debug/sessions", get(debug_sessions))
        .layer(RequestBodyLimitLayer::new(1024 * 1024)) // 1 MiB
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(config: Config, surface: Arc<dyn HostSurface>) -> Result<()> {
    let state = AppState::new(config.clone(), surface);

    // Tool startup hooks are fail-fast; a broken tool stops the server.
    state.mcp_server.tools.initialize_all().await?;

    let reaper_state = state.clone();
    tokio::spawn(async move {
        session_reaper(reaper_state).await;
    });

    let app = build_router(state.clone());
    let address = config.server_address();
    info!("Server listening on {}", address);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Best-effort teardown: stop streams, close sessions, run cleanups.
    state.jobs.cancel_all();
    state.sessions.close_all();
    state.mcp_server.tools.cleanup_all().await;
    info!("Server stopped gracefully");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}

/// Idle-session eviction. The session timeout is configuration-driven; the
/// reaper enforces it so abandoned streams do not accumulate.
async fn session_reaper(state: AppState) {
    let timeout = chrono::Duration::seconds(state.config.session_timeout_secs as i64);
    let wake_secs = std::cmp::max(state.config.session_timeout_secs / 2, 5);
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(wake_secs));
    interval.tick().await; // the first tick fires immediately

    loop {
        interval.tick().await;
        let evicted = state.sessions.evict_idle(timeout);
        if evicted > 0 {
            info!("Reaped {} idle session(s)", evicted);
        }
    }
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|accept| accept.to_str().ok())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false)
}

/// Tiny inline status page for browsers; JSON everywhere else.
fn status_page(title: &str, payload: &Value) -> String {
    let pretty = serde_json::to_string_pretty(payload).unwrap_or_default();
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body style=\"font-family: monospace; padding: 2rem;\"><h1>{title}</h1>\
         <pre>{pretty}</pre></body></html>"
    )
}

async fn health_check(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let sessions: Vec<Value> = state
        .sessions
        .snapshot()
        .into_iter()
        .map(|summary| {
            json!({
                "sessionId": summary.session_id,
                "isConnected": summary.is_connected,
            })
        })
        .collect();

    let payload = json!({
        "status": "ok",
        "activeSessions": state.sessions.count(),
        "server": "viewport-mcp",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "sessions": sessions,
    });

    if wants_html(&headers) {
        Html(status_page("viewport-mcp health", &payload)).into_response()
    } else {
        Json(payload).into_response()
    }
}

async fn debug_sessions(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let payload = json!({
        "activeSessions": state.sessions.count(),
        "activeNotificationJobs": state.jobs.active_count(),
        "sessions": state.sessions.snapshot(),
    });

    if wants_html(&headers) {
        Html(status_page("viewport-mcp sessions", &payload)).into_response()
    } else {
        Json(payload).into_response()
    }
}

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use viewport_mcp::{
    config::{ClassifierFallback, Config},
    server::run_server,
    surface::DetachedSurface,
};

#[derive(Parser)]
#[command(name = "viewport-mcp")]
#[command(about = "An MCP server that renders agent content on a host display surface")]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, default_value = "3000")]
    port: u16,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Idle sessions are evicted after this many seconds
    #[arg(long, default_value = "300")]
    session_timeout_secs: u64,

    /// Deadline for a single tool call in seconds
    #[arg(long, default_value = "30")]
    tool_timeout_secs: u64,

    /// Base URL of the OpenAI-compatible endpoint used for auto content
    /// type detection
    #[arg(long, default_value = "https://api.openai.com/v1")]
    classifier_base_url: String,

    /// Model used for auto content type detection
    #[arg(long, default_value = "gpt-4o-mini")]
    classifier_model: String,

    /// Behavior when the classifier is unavailable or fails
    #[arg(long, value_enum, default_value_t = ClassifierFallback::Lenient)]
    classifier_fallback: ClassifierFallback,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing with both console and file logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let logs_dir = std::path::Path::new(".viewport-mcp/logs");
    std::fs::create_dir_all(logs_dir)?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, "server.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter.clone()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter),
        )
        .init();

    let classifier_api_key = std::env::var("VIEWPORT_CLASSIFIER_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .ok();

    info!("Starting viewport-mcp server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Server: {}:{}", args.host, args.port);
    info!(
        "Classifier: {} ({})",
        if classifier_api_key.is_some() {
            "enabled"
        } else {
            "disabled"
        },
        args.classifier_fallback
    );

    let config = Config {
        host: args.host,
        port: args.port,
        session_timeout_secs: args.session_timeout_secs,
        tool_timeout_secs: args.tool_timeout_secs,
        classifier_base_url: args.classifier_base_url,
        classifier_model: args.classifier_model,
        classifier_api_key,
        classifier_fallback: args.classifier_fallback,
    };

    // A standalone process has no display host; tools that need one fail
    // with setup guidance until the crate is embedded next to a surface.
    run_server(config, Arc::new(DetachedSurface)).await?;

    Ok(())
}

use clap::ValueEnum;

/// Policy for the `auto` content type when the LLM classifier is disabled
/// or fails. `Lenient` falls back to treating the content as HTML with a
/// logged warning; `Strict` surfaces the classifier error to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClassifierFallback {
    Lenient,
    Strict,
}

impl std::fmt::Display for ClassifierFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierFallback::Lenient => write!(f, "lenient"),
            ClassifierFallback::Strict => write!(f, "strict"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Sessions idle longer than this are closed by the reaper.
    pub session_timeout_secs: u64,
    /// Deadline applied to every tool handler invocation.
    pub tool_timeout_secs: u64,
    pub classifier_base_url: String,
    pub classifier_model: String,
    pub classifier_api_key: Option<String>,
    pub classifier_fallback: ClassifierFallback,
}

impl Config {
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Relative endpoint a client POSTs its correlated messages to,
    /// announced during the SSE handshake.
    pub fn messages_endpoint(session_id: &str) -> String {
        format!("/messages?sessionId={}", session_id)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            session_timeout_secs: 300,
            tool_timeout_secs: 30,
            classifier_base_url: "https://api.openai.com/v1".to_string(),
            classifier_model: "gpt-4o-mini".to_string(),
            classifier_api_key: None,
            classifier_fallback: ClassifierFallback::Lenient,
        }
    }
}

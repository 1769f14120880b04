//! Timed notification streams pushed over a session's transport.
//!
//! Each `start-notification-stream` call runs one loop with its own job id.
//! Cancellation is cooperative: the loop checks the active-job set once per
//! interval, so a cancelled job stops at its next wakeup.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{mcp::constants::JsonRpcEnvelopes, session::SessionTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationLevel::Debug => "debug",
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(NotificationLevel::Debug),
            "info" => Some(NotificationLevel::Info),
            "warning" | "warn" => Some(NotificationLevel::Warning),
            "error" => Some(NotificationLevel::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamParams {
    pub interval_ms: u64,
    pub count: u32,
    pub template: String,
    pub level: NotificationLevel,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub job_id: String,
    pub session_id: String,
    pub interval_ms: u64,
    pub count: u32,
    pub started_at: DateTime<Utc>,
}

/// Per-attempt record in a stream's outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    pub counter: u32,
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamOutcome {
    pub job_id: String,
    pub total_sent: u32,
    pub results: Vec<AttemptResult>,
}

/// Active-job set. Only creation and cancellation mutate it; each running
/// loop reads it once per iteration.
#[derive(Clone, Default)]
pub struct NotificationJobs {
    jobs: Arc<DashMap<String, JobInfo>>,
}

impl NotificationJobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, session_id: &str, params: &StreamParams) -> String {
        let job_id = Uuid::new_v4().to_string();
        self.jobs.insert(
            job_id.clone(),
            JobInfo {
                job_id: job_id.clone(),
                session_id: session_id.to_string(),
                interval_ms: params.interval_ms,
                count: params.count,
                started_at: Utc::now(),
            },
        );
        job_id
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }

    pub fn active_count(&self) -> usize {
        self.jobs.len()
    }

    fn finish(&self, job_id: &str) {
        self.jobs.remove(job_id);
    }

    /// Clear the whole set; every running loop stops at its next check.
    pub fn cancel_all(&self) -> usize {
        let cancelled = self.jobs.len();
        self.jobs.clear();
        if cancelled > 0 {
            info!("Cancelled {} notification job(s)", cancelled);
        }
        cancelled
    }

    pub fn cancel_for_session(&self, session_id: &str) -> usize {
        let stale: Vec<String> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().session_id == session_id)
            .map(|entry| entry.key().clone())
            .collect();
        for job_id in &stale {
            self.jobs.remove(job_id);
        }
        stale.len()
    }
}

/// Run one notification stream to completion. Send failures are tolerated
/// per iteration; a closed session or a cancelled job ends the loop early.
pub async fn run_stream(
    jobs: NotificationJobs,
    transport: Arc<SessionTransport>,
    job_id: String,
    params: StreamParams,
) -> StreamOutcome {
    let mut results = Vec::with_capacity(params.count as usize);
    let mut total_sent = 0u32;

    for counter in 1..=params.count {
        sleep(Duration::from_millis(params.interval_ms)).await;

        if !jobs.is_active(&job_id) {
            info!(
                "Notification job {} cancelled after {} of {} message(s)",
                job_id, total_sent, params.count
            );
            break;
        }
        if transport.is_closed() {
            info!(
                "Notification job {} stopping: session closed after {} message(s)",
                job_id, total_sent
            );
            break;
        }

        let message = substitute(&params.template, counter, params.level, transport.id());
        let envelope = JsonRpcEnvelopes::log_message(
            params.level.as_str(),
            json!({
                "message": message,
                "counter": counter,
                "jobId": job_id,
            }),
        );
        match transport.send(envelope) {
            Ok(()) => {
                total_sent += 1;
                results.push(AttemptResult {
                    counter,
                    sent: true,
                    detail: None,
                });
            }
            Err(e) => {
                warn!(
                    "Notification job {} failed to send message {}: {}",
                    job_id, counter, e
                );
                results.push(AttemptResult {
                    counter,
                    sent: false,
                    detail: Some(e.to_string()),
                });
                if transport.is_closed() {
                    break;
                }
            }
        }
    }

    jobs.finish(&job_id);
    debug!("Notification job {} finished, sent {}", job_id, total_sent);
    StreamOutcome {
        job_id,
        total_sent,
        results,
    }
}

fn substitute(
    template: &str,
    counter: u32,
    level: NotificationLevel,
    session_id: Option<&str>,
) -> String {
    template
        .replace("{counter}", &counter.to_string())
        .replace("{timestamp}", &Utc::now().to_rfc3339())
        .replace("{level}", level.as_str())
        .replace("{sessionId}", session_id.unwrap_or(""))
}

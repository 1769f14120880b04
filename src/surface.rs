//! The host display collaborator. Window creation and script injection are
//! host concerns; this crate only defines the seam and fails with setup
//! guidance when no host is wired in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectConfig {
    pub code: String,
}

/// Host surface collaborator, injected into [`crate::server::AppState`] at
/// construction. Absence is a configuration problem surfaced as an
/// `Environment` error, never a silent no-op.
#[async_trait]
pub trait HostSurface: Send + Sync {
    async fn create_window(&self, config: WindowConfig) -> Result<Value>;

    async fn inject_js(&self, config: InjectConfig) -> Result<Value>;
}

/// Default surface for a standalone server process: every operation fails
/// with guidance on how to embed the crate next to a real display host.
pub struct DetachedSurface;

#[async_trait]
impl HostSurface for DetachedSurface {
    async fn create_window(&self, _config: WindowConfig) -> Result<Value> {
        Err(AppError::Environment(
            "no display host is attached to this server. Embed viewport-mcp in a host \
             application and pass a HostSurface implementation to run_server, or connect \
             from a host that provides window creation"
                .to_string(),
        ))
    }

    async fn inject_js(&self, _config: InjectConfig) -> Result<Value> {
        Err(AppError::Environment(
            "no display host is attached to this server, so there is no window to \
             inject scripts into. Render content from an embedded host first"
                .to_string(),
        ))
    }
}

/// Surface that acknowledges operations without displaying anything.
/// Useful for headless smoke-testing a deployment.
pub struct NullSurface;

#[async_trait]
impl HostSurface for NullSurface {
    async fn create_window(&self, config: WindowConfig) -> Result<Value> {
        Ok(json!({
            "windowId": uuid::Uuid::new_v4().to_string(),
            "title": config.title,
            "displayed": false,
        }))
    }

    async fn inject_js(&self, _config: InjectConfig) -> Result<Value> {
        Ok(json!({ "injected": false }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detached_surface_fails_with_guidance() {
        let err = DetachedSurface
            .create_window(WindowConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Environment(_)));
        assert!(err.to_string().contains("HostSurface"));
    }
}

//! Cache of the most recently rendered document, kept in both HTML and
//! Markdown form so agents can read back what is currently on screen.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::content::html2md::HtmlToMarkdown;

#[derive(Debug, Clone)]
pub struct CachedRender {
    pub title: String,
    pub html: String,
    pub markdown: String,
    pub rendered_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct RenderCache {
    inner: Arc<RwLock<Option<CachedRender>>>,
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
        }
    }

    /// Store a rendered document. The Markdown form is derived eagerly so
    /// read-back never pays the conversion cost on the request path.
    pub async fn store(&self, title: &str, html: &str) {
        let markdown = HtmlToMarkdown::new().convert(html);
        let mut slot = self.inner.write().await;
        *slot = Some(CachedRender {
            title: title.to_string(),
            html: html.to_string(),
            markdown,
            rendered_at: Utc::now(),
        });
    }

    pub async fn get(&self) -> Option<CachedRender> {
        self.inner.read().await.clone()
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_derives_markdown_from_html() {
        let cache = RenderCache::new();
        cache
            .store("Status", "<h1>Status</h1><ul><li>ok</li></ul>")
            .await;

        let cached = cache.get().await.unwrap();
        assert_eq!(cached.title, "Status");
        assert!(cached.markdown.contains("# Status"));
        assert!(cached.markdown.contains("- ok"));
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let cache = RenderCache::new();
        cache.store("t", "<p>x</p>").await;
        cache.clear().await;
        assert!(cache.get().await.is_none());
    }
}

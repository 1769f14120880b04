//! Content resolution: turning a `(type, content)` spec into renderable
//! HTML or a direct URL the host surface can load itself.

pub mod classifier;
pub mod html2md;
pub mod markdown;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::{ClassifierFallback, Config},
    error::{AppError, Result},
};
use classifier::ContentClassifier;
use markdown::MarkdownRenderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Html,
    Url,
    Markdown,
    Image,
    Auto,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Html => "html",
            ContentKind::Url => "url",
            ContentKind::Markdown => "markdown",
            ContentKind::Image => "image",
            ContentKind::Auto => "auto",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(ContentKind::Html),
            "url" => Ok(ContentKind::Url),
            "markdown" => Ok(ContentKind::Markdown),
            "image" => Ok(ContentKind::Image),
            "auto" => Ok(ContentKind::Auto),
            other => Err(AppError::Validation(format!(
                "invalid content type '{}' (expected html, url, markdown, image or auto)",
                other
            ))),
        }
    }
}

/// Outcome of content resolution. Exactly one of `html` / `direct_url` is
/// populated, and `kind` is always concrete (never `auto`).
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedContent {
    #[serde(rename = "resolvedType")]
    pub kind: ContentKind,
    #[serde(rename = "subType", skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(rename = "directUrl", skip_serializing_if = "Option::is_none")]
    pub direct_url: Option<String>,
}

impl ResolvedContent {
    fn html(kind: ContentKind, sub_type: Option<&str>, html: String) -> Self {
        Self {
            kind,
            sub_type: sub_type.map(|s| s.to_string()),
            html: Some(html),
            direct_url: None,
        }
    }

    fn direct(url: String) -> Self {
        Self {
            kind: ContentKind::Url,
            sub_type: None,
            html: None,
            direct_url: Some(url),
        }
    }
}

pub struct ContentResolver {
    classifier: ContentClassifier,
    fallback: ClassifierFallback,
    markdown: MarkdownRenderer,
}

impl ContentResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            classifier: ContentClassifier::from_config(config),
            fallback: config.classifier_fallback,
            markdown: MarkdownRenderer::new(),
        }
    }

    /// A resolver that cannot classify; `auto` follows the fallback policy.
    pub fn without_classifier(fallback: ClassifierFallback) -> Self {
        Self {
            classifier: ContentClassifier::disabled(),
            fallback,
            markdown: MarkdownRenderer::new(),
        }
    }

    pub async fn resolve(&self, kind: ContentKind, content: &str) -> Result<ResolvedContent> {
        match kind {
            ContentKind::Auto => match self.classifier.classify(content).await {
                Ok(detected) => {
                    debug!("Auto content classified as '{}'", detected);
                    self.resolve_concrete(detected, content).await
                }
                Err(e) => match self.fallback {
                    ClassifierFallback::Lenient => {
                        warn!(
                            "Content classification failed ({}); falling back to HTML treatment",
                            e
                        );
                        Ok(ResolvedContent::html(
                            ContentKind::Html,
                            Some("auto-fallback"),
                            content.to_string(),
                        ))
                    }
                    ClassifierFallback::Strict => Err(e),
                },
            },
            concrete => self.resolve_concrete(concrete, content).await,
        }
    }

    async fn resolve_concrete(&self, kind: ContentKind, content: &str) -> Result<ResolvedContent> {
        match kind {
            ContentKind::Html => {
                if !(content.contains('<') && content.contains('>')) {
                    return Err(AppError::ContentResolution(
                        "content does not look like HTML (no angle brackets found); \
                         use type 'markdown' for plain text"
                            .to_string(),
                    ));
                }
                Ok(ResolvedContent::html(
                    ContentKind::Html,
                    None,
                    content.to_string(),
                ))
            }
            ContentKind::Url => {
                // Network URLs are handed to the host surface untouched so
                // it can load them directly; embedding remote pages trips
                // cross-origin and script policies.
                if is_network_url(content) {
                    return Ok(ResolvedContent::direct(content.trim().to_string()));
                }
                self.resolve_local_file(content).await
            }
            ContentKind::Markdown => Ok(ResolvedContent::html(
                ContentKind::Markdown,
                None,
                self.markdown.to_document(content),
            )),
            ContentKind::Image => self.resolve_image(content).await,
            ContentKind::Auto => Err(AppError::ContentResolution(
                "auto must be resolved to a concrete type before rendering".to_string(),
            )),
        }
    }

    async fn resolve_local_file(&self, raw_path: &str) -> Result<ResolvedContent> {
        let absolute = absolutize(raw_path.trim())?;
        let text = tokio::fs::read_to_string(&absolute).await.map_err(|_| {
            AppError::ContentResolution(format!("file not found: {}", absolute.display()))
        })?;

        let extension = absolute
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "html" | "htm" => Ok(ResolvedContent::html(ContentKind::Url, Some("html"), text)),
            "md" | "markdown" => Ok(ResolvedContent::html(
                ContentKind::Url,
                Some("markdown"),
                self.markdown.to_document(&text),
            )),
            other => Ok(ResolvedContent::html(
                ContentKind::Url,
                Some(if other.is_empty() { "text" } else { other }),
                text_viewer_page(&absolute.display().to_string(), &text),
            )),
        }
    }

    async fn resolve_image(&self, content: &str) -> Result<ResolvedContent> {
        let content = content.trim();
        if let Some(rest) = content.strip_prefix("data:image/") {
            let payload = rest.split_once(";base64,").map(|(_, data)| data).ok_or_else(|| {
                AppError::ContentResolution(
                    "image data URI must be base64-encoded (data:image/...;base64,...)".to_string(),
                )
            })?;
            use base64::Engine;
            base64::engine::general_purpose::STANDARD
                .decode(payload)
                .map_err(|e| {
                    AppError::ContentResolution(format!("invalid base64 image data: {}", e))
                })?;
            return Ok(ResolvedContent::html(
                ContentKind::Image,
                Some("data-uri"),
                image_page(content),
            ));
        }

        let absolute = absolutize(content)?;
        if tokio::fs::metadata(&absolute).await.is_err() {
            return Err(AppError::ContentResolution(format!(
                "image file not found: {}",
                absolute.display()
            )));
        }
        let uri = format!("file://{}", absolute.display());
        Ok(ResolvedContent::html(
            ContentKind::Image,
            Some("file"),
            image_page(&uri),
        ))
    }
}

fn is_network_url(candidate: &str) -> bool {
    Url::parse(candidate.trim())
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn absolutize(raw: &str) -> Result<PathBuf> {
    let path = Path::new(raw);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Minimal viewer for files that are neither HTML nor Markdown.
fn text_viewer_page(title: &str, raw: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{}</title>
<style>
body {{ margin: 0; background: #f6f8fa; }}
pre {{ font-family: ui-monospace, "SF Mono", Consolas, monospace; padding: 1.5rem; margin: 0; white-space: pre-wrap; word-break: break-word; }}
</style>
</head>
<body>
<pre>{}</pre>
</body>
</html>"#,
        escape_html(title),
        escape_html(raw)
    )
}

fn image_page(src: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Image</title>
<style>
body {{ margin: 0; display: flex; align-items: center; justify-content: center; min-height: 100vh; background: #1e1e1e; }}
img {{ max-width: 100%; max-height: 100vh; }}
</style>
</head>
<body>
<img src="{}" alt="rendered image">
</body>
</html>"#,
        escape_html(src)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn resolver() -> ContentResolver {
        ContentResolver::without_classifier(ClassifierFallback::Lenient)
    }

    #[tokio::test]
    async fn network_urls_pass_through_without_file_access() {
        let resolved = resolver()
            .resolve(ContentKind::Url, "https://example.com")
            .await
            .unwrap();
        assert_eq!(resolved.direct_url.as_deref(), Some("https://example.com"));
        assert!(resolved.html.is_none());
    }

    #[tokio::test]
    async fn html_requires_angle_brackets() {
        let err = resolver()
            .resolve(ContentKind::Html, "not html")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ContentResolution(_)));

        let ok = resolver()
            .resolve(ContentKind::Html, "<p>hello</p>")
            .await
            .unwrap();
        assert_eq!(ok.html.as_deref(), Some("<p>hello</p>"));
    }

    #[tokio::test]
    async fn markdown_input_renders_to_a_document() {
        let resolved = resolver()
            .resolve(ContentKind::Markdown, "# Title\n\n- a\n- b")
            .await
            .unwrap();
        let html = resolved.html.unwrap();
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<li>a</li>"));
    }

    #[tokio::test]
    async fn markdown_file_renders_heading() {
        let mut file = tempfile::Builder::new().suffix(".md").tempfile().unwrap();
        writeln!(file, "# Title").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let resolved = resolver().resolve(ContentKind::Url, &path).await.unwrap();
        assert!(resolved.html.unwrap().contains("<h1>Title</h1>"));
        assert_eq!(resolved.sub_type.as_deref(), Some("markdown"));
    }

    #[tokio::test]
    async fn unknown_extension_is_wrapped_and_escaped() {
        let mut file = tempfile::Builder::new().suffix(".log").tempfile().unwrap();
        writeln!(file, "a < b && b > c").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let resolved = resolver().resolve(ContentKind::Url, &path).await.unwrap();
        let html = resolved.html.unwrap();
        assert!(html.contains("<pre>"));
        assert!(html.contains("a &lt; b &amp;&amp; b &gt; c"));
    }

    #[tokio::test]
    async fn missing_file_is_a_resolution_error() {
        let err = resolver()
            .resolve(ContentKind::Url, "/definitely/not/here.html")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }

    #[tokio::test]
    async fn data_uri_images_are_embedded() {
        let resolved = resolver()
            .resolve(ContentKind::Image, "data:image/png;base64,AAAA")
            .await
            .unwrap();
        let html = resolved.html.unwrap();
        assert!(html.contains("<img src=\"data:image/png;base64,AAAA\""));
    }

    #[tokio::test]
    async fn invalid_base64_image_is_rejected() {
        let err = resolver()
            .resolve(ContentKind::Image, "data:image/png;base64,@@@not-base64@@@")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid base64"));
    }

    #[tokio::test]
    async fn missing_image_file_is_rejected() {
        let err = resolver()
            .resolve(ContentKind::Image, "/no/such/image.png")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("image file not found"));
    }

    #[tokio::test]
    async fn auto_without_classifier_falls_back_leniently() {
        let resolved = resolver()
            .resolve(ContentKind::Auto, "plain text either way")
            .await
            .unwrap();
        assert_eq!(resolved.sub_type.as_deref(), Some("auto-fallback"));
        assert_eq!(resolved.html.as_deref(), Some("plain text either way"));
    }

    #[tokio::test]
    async fn auto_without_classifier_fails_strictly() {
        let strict = ContentResolver::without_classifier(ClassifierFallback::Strict);
        let err = strict
            .resolve(ContentKind::Auto, "plain text either way")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Classifier(_)));
    }

    #[test]
    fn content_kind_parses_and_rejects() {
        assert_eq!("HTML".parse::<ContentKind>().unwrap(), ContentKind::Html);
        assert_eq!("auto".parse::<ContentKind>().unwrap(), ContentKind::Auto);
        assert!("pdf".parse::<ContentKind>().is_err());
    }
}

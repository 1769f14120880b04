//! LLM-assisted content type detection for `type=auto` content specs.
//!
//! One short prompt against an OpenAI-style chat completions endpoint, a
//! single-word answer, mapped through a synonym table onto a concrete
//! [`ContentKind`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ContentKind;
use crate::{
    config::Config,
    error::{AppError, Result},
};

/// Content sent to the classifier is truncated to this many characters to
/// bound request size.
pub const CLASSIFY_SAMPLE_LIMIT: usize = 2000;

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct ContentClassifier {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl ContentClassifier {
    pub fn from_config(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.classifier_base_url.trim_end_matches('/').to_string(),
            model: config.classifier_model.clone(),
            api_key: config.classifier_api_key.clone(),
        }
    }

    /// A classifier with no credentials; every call fails with a
    /// `Classifier` error, which the resolver's fallback policy absorbs.
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: String::new(),
            model: String::new(),
            api_key: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Ask the model to classify `content` as one of the concrete content
    /// types. Never returns [`ContentKind::Auto`].
    pub async fn classify(&self, content: &str) -> Result<ContentKind> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            AppError::Classifier("classifier is disabled (no API key configured)".to_string())
        })?;

        let sample: String = content.chars().take(CLASSIFY_SAMPLE_LIMIT).collect();
        let prompt = format!(
            "Classify the following content as exactly one word: html, url, markdown, or image.\n\
             Answer with the single word only.\n\nContent:\n{}",
            sample
        );

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            max_tokens: 8,
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Classifier(format!("classifier request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Classifier(format!(
                "classifier returned {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::Classifier(format!("invalid classifier response: {}", e)))?;

        let answer = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .unwrap_or_default();
        debug!("Classifier answered '{}' for {} chars", answer, sample.len());

        map_type_answer(&answer).ok_or_else(|| {
            AppError::Classifier(format!("unrecognized classifier answer '{}'", answer))
        })
    }
}

/// Map the model's single-word answer onto a concrete content type. Covers
/// the common synonyms a loosely-prompted model produces.
pub fn map_type_answer(answer: &str) -> Option<ContentKind> {
    let word = answer
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_ascii_lowercase();
    match word.as_str() {
        "html" | "webpage" | "page" | "xml" => Some(ContentKind::Html),
        "url" | "link" | "website" | "address" | "uri" => Some(ContentKind::Url),
        "markdown" | "md" | "text" | "plaintext" | "document" => Some(ContentKind::Markdown),
        "image" | "picture" | "photo" | "img" | "graphic" => Some(ContentKind::Image),
        _ => None,
    }
}

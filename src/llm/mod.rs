//! AI summarization of page and site content.
//!
//! Talks to an OpenAI-compatible chat completions endpoint. Without a
//! credential the client degrades to a local preview instead of failing, so
//! crawls never depend on the API being configured.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::SummarizerSettings;

/// System prompt for single-page summaries.
const PAGE_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that summarizes web page content concisely.";

/// System prompt for the site-level synthesis.
const SITE_SYSTEM_PROMPT: &str = "You are a helpful assistant. You will be given summaries of \
     multiple pages from a single website. Create a cohesive site summary describing what the \
     website is about and what information it contains.";

/// Characters of the page shown in the no-credential preview.
const PREVIEW_CHARS: usize = 200;

/// Combined page-summary budget for the site synthesis request.
const SITE_INPUT_CHARS: usize = 15_000;

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("summarization request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("summarization returned no completion")]
    EmptyCompletion,
}

/// Capability to summarize page text and synthesize a site summary.
///
/// The credential is passed per call: concurrent crawls for different roots
/// may carry different keys, so there is no shared credential state.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize_page(
        &self,
        text: &str,
        credential: Option<&str>,
    ) -> Result<String, SummarizeError>;

    async fn summarize_site(
        &self,
        page_summaries: &[String],
        credential: Option<&str>,
    ) -> Result<String, SummarizeError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
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

/// Summarizer backed by an OpenAI-compatible chat endpoint.
pub struct OpenAiSummarizer {
    client: Client,
    settings: SummarizerSettings,
}

impl OpenAiSummarizer {
    pub fn new(settings: SummarizerSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    async fn chat(
        &self,
        credential: &str,
        system: &str,
        user: String,
    ) -> Result<String, SummarizeError> {
        debug!(model = %self.settings.model, "requesting summary");
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: system.into(),
                },
                ChatMessage {
                    role: "user".into(),
                    content: user,
                },
            ],
        };

        let response: ChatResponse = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(credential)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(SummarizeError::EmptyCompletion)
    }
}

/// Truncate on a character boundary.
fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Local stand-in summary when no credential is available.
fn preview_summary(text: &str) -> String {
    let preview = truncate_chars(text, PREVIEW_CHARS).replace('\n', " ");
    let word_count = text.split_whitespace().count();
    format!("Preview: {preview}...\n(Total words: {word_count})")
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize_page(
        &self,
        text: &str,
        credential: Option<&str>,
    ) -> Result<String, SummarizeError> {
        if text.is_empty() {
            return Ok("No content.".to_string());
        }
        let Some(credential) = credential else {
            return Ok(preview_summary(text));
        };

        let prompt = format!(
            "Please provide a concise summary of the following website content:\n\n{}",
            truncate_chars(text, self.settings.max_content_chars)
        );
        self.chat(credential, PAGE_SYSTEM_PROMPT, prompt).await
    }

    async fn summarize_site(
        &self,
        page_summaries: &[String],
        credential: Option<&str>,
    ) -> Result<String, SummarizeError> {
        if page_summaries.is_empty() {
            return Ok("No content to summarize.".to_string());
        }
        let Some(credential) = credential else {
            return Ok("Site summary unavailable: add an API credential to generate one.".to_string());
        };

        let combined = truncate_chars(&page_summaries.join("\n\n"), SITE_INPUT_CHARS);
        let prompt =
            format!("Here are the summaries of the pages on the website:\n\n{combined}");
        self.chat(credential, SITE_SYSTEM_PROMPT, prompt).await
    }
}

//! Text-completion backend abstraction.
//!
//! Defines the [`CompletionBackend`] trait and [`OpenAiClient`], which calls
//! an OpenAI-compatible `POST /chat/completions` endpoint.
//!
//! The backend is optional: when no API key is configured the server runs
//! without one, heuristic-only paths keep working and AI-only endpoints
//! answer with a "not configured" error.
//!
//! No request is retried. A failed completion degrades the caller's result
//! (see [`crate::relevance`]) or is surfaced, never repeated.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::CompletionConfig;
use crate::error::{AnalyzerError, Result};

/// One message in a completion conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling options for one completion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Raw upstream byte chunks of a streamed completion.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// A text-completion service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run a completion and return the whole reply text.
    async fn complete(&self, messages: Vec<ChatMessage>, options: CompletionOptions)
        -> Result<String>;

    /// Start a streamed completion.
    ///
    /// Resolves once the upstream has answered with a success status; the
    /// returned stream yields the raw event-stream body.
    async fn stream(&self, messages: Vec<ChatMessage>, options: CompletionOptions)
        -> Result<ByteStream>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Option<ReplyMessage>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// [`CompletionBackend`] for OpenAI-compatible chat completion APIs.
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiClient {
    /// `timeout_secs` bounds connecting and each read. Whole-call deadlines
    /// only apply to non-streamed completions, so a long streamed reply is
    /// never cut off while deltas keep arriving.
    pub fn new(config: &CompletionConfig, api_key: impl Into<String>) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: api_key.into(),
            timeout,
        })
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stream,
        };

        let mut request = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body);
        if !stream {
            request = request.timeout(self.timeout);
        }
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorEnvelope>()
            .await
            .ok()
            .and_then(|e| e.error)
            .and_then(|e| e.message)
            .unwrap_or_else(|| "API error".to_string());

        Err(AnalyzerError::Upstream {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<String> {
        let response = self.send(&messages, options, false).await?;
        let reply: CompletionResponse = response.json().await?;
        Ok(reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default())
    }

    async fn stream(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<ByteStream> {
        let response = self.send(&messages, options, true).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(AnalyzerError::from))
            .boxed())
    }
}

/// Remove Markdown code-fence markers (```` ``` ````, ```` ```json ````,
/// ```` ```mermaid ````) from model output and trim it.
pub fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find("```") {
        out.push_str(&rest[..idx]);
        rest = &rest[idx + 3..];
        // An info string directly follows the opening fence.
        let info_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        rest = &rest[info_len..];
    }
    out.push_str(rest);
    out.trim().to_string()
}

// LLM module
// Chat completion client for OpenAI-compatible endpoints


use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{Config, LlmSettings};

const DEFAULT_TIMEOUT_SECONDS: u64 = 120;
const MAX_ERROR_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A model that continues a conversation with one reply
pub trait ChatModel: Send + Sync {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Client for `POST {base}/chat/completions`
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    endpoint: Url,
    api_key: String,
    model: String,
    temperature: f32,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

impl OpenAiChatClient {
    #[inline]
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let endpoint = format!(
            "{}/chat/completions",
            settings.api_base.trim().trim_end_matches('/')
        );
        let endpoint = Url::parse(&endpoint)
            .with_context(|| format!("Invalid LLM endpoint: {}", settings.api_base))?;

        let agent = build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS));

        Ok(Self {
            endpoint,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            agent,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl ChatModel for OpenAiChatClient {
    /// Single attempt; failures are returned to the caller
    #[inline]
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize chat request")?;

        debug!(
            "Sending {} messages to {} ({})",
            messages.len(),
            self.endpoint,
            self.model
        );

        let mut response = self
            .agent
            .post(self.endpoint.as_str())
            .header("Content-Type", "application/json")
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .send(&request_json)
            .map_err(|e| anyhow::anyhow!("LLM request failed: {}", e))?;

        let status = response.status();
        let body = response.body_mut().read_to_string();

        if !status.is_success() {
            let reason = body.as_deref().map(error_reason).unwrap_or_default();
            return Err(if reason.is_empty() {
                anyhow::anyhow!("LLM request failed: HTTP {}", status.as_u16())
            } else {
                anyhow::anyhow!("LLM request failed: HTTP {}: {}", status.as_u16(), reason)
            });
        }

        let response_text = body.map_err(|e| anyhow::anyhow!("LLM request failed: {}", e))?;
        let response: CompletionResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("LLM response contained no message")
    }

    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Status errors are handled by the caller so the provider's reason can be reported
fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// The provider's explanation from an error body: `error.message` when the body
/// is OpenAI-style JSON, otherwise the trimmed text cut to `MAX_ERROR_CHARS`
fn error_reason(body: &str) -> String {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|parsed| parsed.error.message);

    match message {
        Some(message) => message.trim().to_string(),
        None => body.trim().chars().take(MAX_ERROR_CHARS).collect(),
    }
}

/// The configured chat model, or `None` (retrieval-only answers) when the
/// endpoint or key is missing or the client cannot be created
#[inline]
pub fn build_chat_model(config: &Config) -> Option<Arc<dyn ChatModel>> {
    let Some(settings) = config.llm_settings() else {
        warn!("LLM_API_BASE or LLM_API_KEY is not set; answers will only show retrieved documents");
        return None;
    };

    match OpenAiChatClient::new(&settings) {
        Ok(client) => {
            info!(
                "Using chat model {} at {}",
                settings.model,
                client.endpoint()
            );
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!("Failed to initialize LLM client: {:#}", e);
            None
        }
    }
}

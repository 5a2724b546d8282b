use crate::client::{CompletionApi, validate_api_key};
use crate::error::{LlmError, Result};
use crate::types::{ChatMessage, Completion, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnthropicSettings {
    pub messages_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub anthropic_version: String,
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            messages_url: ANTHROPIC_MESSAGES_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            anthropic_version: ANTHROPIC_VERSION.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    settings: AnthropicSettings,
}

impl AnthropicClient {
    pub fn new(http: reqwest::Client, settings: AnthropicSettings) -> Self {
        Self { http, settings }
    }
}

#[async_trait]
impl CompletionApi for AnthropicClient {
    #[tracing::instrument(level = "info", skip_all, fields(model = %self.settings.model))]
    async fn complete(&self, api_key: &str, prompt: &str) -> Result<Completion> {
        validate_api_key(api_key)?;
        let req = AnthropicRequest::new(
            &self.settings.model,
            self.settings.max_tokens,
            vec![ChatMessage::user(prompt)],
        );

        let response = self
            .http
            .post(&self.settings.messages_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.settings.anthropic_version)
            .json(&req)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Upstream {
                status: status.as_u16(),
                message: upstream_error_message(&body),
                payload: body,
            });
        }

        let parsed: AnthropicResponse = serde_json::from_str(&body)?;
        parsed.try_into()
    }

    fn model(&self) -> &str {
        &self.settings.model
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

impl AnthropicRequest {
    fn new(model: &str, max_tokens: u32, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.to_string(),
            max_tokens,
            messages,
        }
    }
}

// Blocks are read loosely: only the `text` of the first one matters.
#[derive(Debug, Default, Deserialize)]
struct AnthropicContentBlock {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    stop_reason: String,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl TryFrom<AnthropicResponse> for Completion {
    type Error = LlmError;

    fn try_from(v: AnthropicResponse) -> Result<Self> {
        let Some(first) = v.content.into_iter().next() else {
            return Err(LlmError::ResponseFormat(
                "response has no content blocks".to_string(),
            ));
        };
        let Some(text) = first.text else {
            return Err(LlmError::ResponseFormat(format!(
                "first content block has no text (type={})",
                first.kind.as_deref().unwrap_or("unknown")
            )));
        };

        Ok(Completion {
            text,
            stop_reason: v.stop_reason,
            usage: Usage {
                prompt_tokens: v.usage.input_tokens,
                completion_tokens: v.usage.output_tokens,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorEnvelope {
    #[serde(default)]
    error: Option<AnthropicErrorBody>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    #[serde(default)]
    message: Option<String>,
}

fn upstream_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<AnthropicErrorEnvelope>(body)
        .ok()?
        .error?
        .message
        .filter(|m| !m.is_empty())
}

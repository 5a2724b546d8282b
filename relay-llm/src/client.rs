use crate::error::Result;
use crate::types::Completion;
use async_trait::async_trait;
use std::time::Duration;

/// Anything that can turn a single user prompt into a completion.
///
/// The credential is passed per call so callers decide when a missing key is an error.
#[async_trait]
pub trait CompletionApi: Send + Sync {
    async fn complete(&self, api_key: &str, prompt: &str) -> Result<Completion>;

    fn model(&self) -> &str;
}

/// Shared HTTP client for upstream calls. `None` keeps reqwest's default (no request timeout).
#[tracing::instrument(level = "debug")]
pub fn build_http_client(timeout: Option<Duration>) -> reqwest::Client {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().unwrap_or_else(|e| {
        tracing::warn!(%e, "reqwest client build failed; falling back to default client");
        reqwest::Client::new()
    })
}

pub(crate) fn validate_api_key(api_key: &str) -> Result<()> {
    if api_key.trim().is_empty() {
        return Err(crate::error::LlmError::InvalidInput(
            "api key must be non-empty".to_string(),
        ));
    }
    Ok(())
}

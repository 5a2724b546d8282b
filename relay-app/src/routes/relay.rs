use crate::outcome::RelayOutcome;
use crate::server::RelayState;
use axum::Extension;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::rejection::BytesRejection;
use axum::http::Method;
use axum::routing::any;
use serde_json::Value;
use std::sync::Arc;

/// Alias kept so clients written against the serverless deployment keep working.
pub const SERVERLESS_FUNCTION_PATH: &str = "/.netlify/functions/analyze";

pub fn router(relay_path: &str, max_body_bytes: usize) -> axum::Router {
    let mut router = axum::Router::new().route(relay_path, any(relay_prompt));
    if relay_path != SERVERLESS_FUNCTION_PATH {
        router = router.route(SERVERLESS_FUNCTION_PATH, any(relay_prompt));
    }
    router.layer(DefaultBodyLimit::max(max_body_bytes))
}

// Body rejections are handled here so they still get the JSON envelope and
// never preempt the method gate.
#[tracing::instrument(level = "info", skip_all, fields(method = %method))]
async fn relay_prompt(
    Extension(state): Extension<Arc<RelayState>>,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> RelayOutcome {
    if method != Method::POST {
        return RelayOutcome::method_not_allowed();
    }
    match body {
        Ok(body) => relay(&state, &method, &body).await,
        Err(rejection) => {
            tracing::warn!(
                status = rejection.status().as_u16(),
                error = %rejection.body_text(),
                "inbound body rejected"
            );
            RelayOutcome::body_rejected(rejection.status(), rejection.body_text())
        }
    }
}

/// One invocation: method gate, body parse, prompt check, credential check, upstream call.
pub async fn relay(state: &RelayState, method: &Method, body: &[u8]) -> RelayOutcome {
    if *method != Method::POST {
        return RelayOutcome::method_not_allowed();
    }

    let prompt = match parse_prompt(body) {
        Ok(prompt) => prompt,
        Err(outcome) => return outcome,
    };

    let Some(api_key) = state.api_key.as_deref() else {
        tracing::error!("ANTHROPIC_API_KEY is not configured");
        return RelayOutcome::api_key_not_configured();
    };

    match state.completions.complete(api_key, &prompt).await {
        Ok(completion) => {
            tracing::info!(
                model = %state.completions.model(),
                prompt_chars = prompt.chars().count(),
                analysis_chars = completion.text.chars().count(),
                stop_reason = %completion.stop_reason,
                input_tokens = completion.usage.prompt_tokens,
                output_tokens = completion.usage.completion_tokens,
                "prompt relayed"
            );
            RelayOutcome::Success {
                analysis: completion.text,
            }
        }
        Err(e) => RelayOutcome::from_llm_error(e),
    }
}

// `prompt` must be a non-empty string; whitespace is forwarded untouched.
fn parse_prompt(body: &[u8]) -> Result<String, RelayOutcome> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "inbound body is not valid json");
        RelayOutcome::invalid_json(&e)
    })?;
    match value.get("prompt") {
        Some(Value::String(prompt)) if !prompt.is_empty() => Ok(prompt.clone()),
        _ => Err(RelayOutcome::prompt_required()),
    }
}

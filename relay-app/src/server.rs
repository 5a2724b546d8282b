//! Prompt relay HTTP server.
//!
//! Builds the shared state once at startup and mounts the relay routes.

use crate::config::{RelayConfig, ServerConfig};
use crate::routes;
use anyhow::Result;
use axum::http::{HeaderMap, Request};
use axum::response::Response;
use axum::{Extension, Router};
use relay_llm::{AnthropicClient, CompletionApi, build_http_client};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// Read-only per-process state shared by every invocation.
pub struct RelayState {
    pub api_key: Option<String>,
    pub completions: Arc<dyn CompletionApi>,
}

impl RelayState {
    pub fn from_config(cfg: &RelayConfig) -> Self {
        let http = build_http_client(cfg.upstream_timeout());
        Self {
            api_key: cfg.api_key(),
            completions: Arc::new(AnthropicClient::new(http, cfg.anthropic_settings())),
        }
    }
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, path) = RelayConfig::load_with_path(config_path).await?;
    let api_key_configured = cfg.api_key().is_some();
    let bind_addr = cfg.bind_addr()?;
    tracing::info!(
        config_path = ?path,
        bind_addr = %bind_addr,
        relay_path = %cfg.server.relay_path,
        upstream_url = %cfg.upstream.messages_url,
        model = %cfg.upstream.model,
        max_tokens = cfg.upstream.max_tokens,
        upstream_timeout_seconds = ?cfg.upstream.timeout_seconds,
        api_key_configured,
        "config ok"
    );
    if !api_key_configured {
        tracing::warn!("ANTHROPIC_API_KEY is not set; relay requests will fail with 500");
    }
    Ok(())
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, cfg_path) = RelayConfig::load_with_path(config_path).await?;
    let addr = cfg.bind_addr()?;
    let state = Arc::new(RelayState::from_config(&cfg));
    tracing::info!(
        config_path = ?cfg_path,
        bind_addr = %addr,
        relay_path = %cfg.server.relay_path,
        upstream_url = %cfg.upstream.messages_url,
        model = %cfg.upstream.model,
        max_body_bytes = cfg.server.max_body_bytes,
        max_tokens = cfg.upstream.max_tokens,
        upstream_timeout_seconds = ?cfg.upstream.timeout_seconds,
        api_key_configured = state.api_key.is_some(),
        "server configuration loaded"
    );
    if state.api_key.is_none() {
        tracing::error!("ANTHROPIC_API_KEY not found in environment or config");
    }

    let listener = preflight_bind_listener(addr).await?;
    let app = build_app(&cfg.server, state);

    tracing::info!(%addr, "prompt relay serving");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("http server shutdown completed");
    Ok(())
}

/// Routes plus request tracing and `x-request-id` propagation.
pub fn build_app(server: &ServerConfig, state: Arc<RelayState>) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
                request_id = %request_id_from_headers(request.headers())
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id_from_headers(request.headers()),
                "http request started"
            );
        })
        .on_response(
            |response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "http request completed"
                );
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(
                    error_class = %error,
                    latency_ms = latency.as_millis() as u64,
                    "http request failed"
                );
            },
        );

    routes::router(&server.relay_path, server.max_body_bytes)
        .layer(Extension(state))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn preflight_bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tracing::info!(%addr, "preflight bind check starting");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("preflight bind failed for {addr}: {e}"))?;
    tracing::info!(%addr, "preflight bind check passed");
    Ok(listener)
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "missing".to_string())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to await ctrl-c signal");
        } else {
            tracing::warn!("received ctrl-c; beginning graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RelayState, build_app, request_id_from_headers};
    use crate::config::{RelayConfig, ServerConfig};
    use axum::body::{Body, to_bytes};
    use axum::http::{HeaderMap, Request, StatusCode};
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn state_without_key() -> Arc<RelayState> {
        Arc::new(RelayState::from_config(&RelayConfig::default()))
    }

    #[test]
    fn request_id_defaults_to_missing() {
        assert_eq!(request_id_from_headers(&HeaderMap::new()), "missing");
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", "abc".parse().expect("header value"));
        assert_eq!(request_id_from_headers(&headers), "abc");
    }

    #[test]
    fn state_from_config_picks_up_key_and_model() {
        let mut cfg = RelayConfig::default();
        cfg.upstream.api_key = Some(" sk-ant-test ".to_string());
        let state = RelayState::from_config(&cfg);
        assert_eq!(state.api_key.as_deref(), Some("sk-ant-test"));
        assert_eq!(state.completions.model(), "claude-sonnet-4-20250514");
    }

    #[tokio::test]
    async fn health_reports_missing_key_and_sets_request_id() {
        let response = build_app(&ServerConfig::default(), state_without_key())
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        let body: serde_json::Value = serde_json::from_slice(&body).expect("response json");
        assert_eq!(body["status"], "ok");
        assert_eq!(body["api_key_configured"], false);
        assert_eq!(body["model"], "claude-sonnet-4-20250514");
    }

    #[tokio::test]
    async fn unknown_paths_return_json_404() {
        let response = build_app(&ServerConfig::default(), state_without_key())
            .oneshot(
                Request::builder()
                    .uri("/nope")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        assert_eq!(&body[..], br#"{"error":"Not found"}"#);
    }
}

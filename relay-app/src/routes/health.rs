use crate::server::RelayState;
use axum::routing::get;
use axum::{Extension, Json};
use chrono::Utc;
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new().route("/healthz", get(get_health))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn get_health(Extension(state): Extension<Arc<RelayState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "api_key_configured": state.api_key.is_some(),
        "model": state.completions.model(),
        "checked_at": Utc::now(),
    }))
}

pub mod health;
pub mod relay;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router};

pub fn router(relay_path: &str, max_body_bytes: usize) -> Router {
    Router::new()
        .merge(health::router())
        .merge(relay::router(relay_path, max_body_bytes))
        .fallback(not_found)
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not found" })),
    )
}

use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness check, returns server metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "git_sha": env!("THREADLINE_GIT_SHA"),
        "storage": state.sessions.backend(),
        "provider": state.chat.provider_name(),
        "model": state.chat.model(),
        "image_provider": state.images.name(),
    }))
}

//! Session browsing endpoints used by the home page and chat page.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use threadline_sessions::{Message, SessionSummary};

use crate::app::AppState;
use crate::http::error::{session_error, ApiError};

#[derive(Serialize)]
pub struct NewChat {
    pub id: String,
}

#[derive(Serialize)]
pub struct ChatTranscript {
    pub id: String,
    pub messages: Vec<Message>,
}

/// GET /api/chats: saved sessions, newest first.
pub async fn list_chats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    state
        .with_sessions(|s| s.list())
        .await
        .map(Json)
        .map_err(session_error)
}

/// POST /api/chats: mint an id; the session is stored on first save.
pub async fn create_chat(State(state): State<Arc<AppState>>) -> (StatusCode, Json<NewChat>) {
    let id = state.sessions.create();
    (
        StatusCode::CREATED,
        Json(NewChat {
            id: id.to_string(),
        }),
    )
}

/// GET /api/chats/{id}: transcript, empty when nothing is saved yet.
pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ChatTranscript>, ApiError> {
    let key = id.clone();
    let messages = state
        .with_sessions(move |s| s.load(&key))
        .await
        .map_err(session_error)?;
    Ok(Json(ChatTranscript { id, messages }))
}

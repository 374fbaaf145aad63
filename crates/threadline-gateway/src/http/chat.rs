//! Streaming chat endpoint: POST /api/chat
//!
//! Request:  `{"chatId": "...", "messages": [ ...full transcript... ]}`
//! Response: `text/event-stream` with events
//!   `delta`       `{"text": "..."}` for each chunk of the reply
//!   `done`        `{"id", "title", "lastModified", "message"}` once the
//!                 transcript is saved; `message` is the stored assistant reply
//!   `save-failed` `{"error": "..."}` when the reply streamed but was not saved
//!   `error`       `{"error": "..."}` when the model call failed (nothing saved)

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::Stream;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::convert::Infallible;
use std::sync::Arc;
use threadline_agent::StreamEvent;
use threadline_sessions::{Message, Part, Role, SessionId};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::app::AppState;
use crate::http::error::{api_error, session_error, ApiError};

pub const SAVE_FAILED_MESSAGE: &str = "message may not have been saved";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    pub chat_id: String,
    pub messages: Vec<Message>,
}

/// POST /api/chat: stream the model's reply, then save the transcript.
///
/// The id is validated before the model is called so a bad id never costs a
/// request. If the client disconnects mid-stream the reply is dropped and
/// nothing is saved.
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let id = SessionId::parse(&body.chat_id).map_err(session_error)?;
    if !body.messages.iter().any(|m| m.role == Role::User) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "messages must include a user message",
        ));
    }
    info!(id = %id, messages = body.messages.len(), "chat request");

    let (tx, rx) = mpsc::channel::<StreamEvent>(64);
    let worker = Arc::clone(&state);
    let prompt = body.messages.clone();
    tokio::spawn(async move {
        if let Err(e) = worker.chat.chat_stream(&prompt, tx.clone()).await {
            warn!(error = %e, "model call failed");
            let _ = tx
                .send(StreamEvent::Error {
                    message: e.to_string(),
                })
                .await;
        }
    });

    Ok(Sse::new(relay(state, id, body.messages, rx)).keep_alive(KeepAlive::default()))
}

/// Forward model events to the client and persist the finished exchange.
fn relay(
    state: Arc<AppState>,
    id: SessionId,
    mut transcript: Vec<Message>,
    mut rx: mpsc::Receiver<StreamEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let mut reply = String::new();
        let mut finished = None;

        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::TextDelta { text } => {
                    reply.push_str(&text);
                    yield Ok(sse_json("delta", &json!({ "text": text })));
                }
                StreamEvent::Done { model, stop_reason, .. } => {
                    finished = Some((model, stop_reason));
                    break;
                }
                StreamEvent::Error { message } => {
                    yield Ok(sse_json("error", &json!({ "error": message })));
                    return;
                }
            }
        }

        let Some((model, stop_reason)) = finished else {
            yield Ok(sse_json("error", &json!({ "error": "model stream ended unexpectedly" })));
            return;
        };

        let message = assistant_message(reply, model, stop_reason);
        transcript.push(message.clone());
        let key = id.to_string();
        match state.with_sessions(move |s| s.save(&key, transcript)).await {
            Ok(summary) => {
                let mut payload = json!(summary);
                payload["message"] = json!(message);
                yield Ok(sse_json("done", &payload));
            }
            Err(e) => {
                error!(id = %id, error = %e, "failed to save chat");
                yield Ok(sse_json("save-failed", &json!({
                    "error": SAVE_FAILED_MESSAGE,
                    "detail": e.to_string(),
                })));
            }
        }
    }
}

fn assistant_message(text: String, model: String, stop_reason: String) -> Message {
    let mut metadata = Map::new();
    metadata.insert("model".to_string(), Value::String(model));
    if !stop_reason.is_empty() {
        metadata.insert("finishReason".to_string(), Value::String(stop_reason));
    }
    let mut extra = Map::new();
    extra.insert("metadata".to_string(), Value::Object(metadata));

    Message {
        role: Role::Assistant,
        parts: vec![Part::text(text)],
        extra,
    }
    .with_id(format!("msg-{}", uuid::Uuid::new_v4().simple()))
}

fn sse_json(name: &str, value: &Value) -> Event {
    Event::default().event(name).data(value.to_string())
}

#[cfg(test)]
mod tests {
    use crate::app::tests::{FixedEditor, Harness};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::json;
    use threadline_agent::image::ImageEditOutcome;
    use threadline_sessions::Role;

    fn chat_request(body: serde_json::Value) -> Request<Body> {
        Request::post("/api/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn hello(chat_id: &str) -> serde_json::Value {
        json!({
            "chatId": chat_id,
            "messages": [{"id": "m1", "role": "user", "parts": [{"type": "text", "text": "Hello"}]}]
        })
    }

    #[tokio::test]
    async fn reply_is_streamed_and_saved() {
        let h = Harness::chatty();
        let (status, body) = h.send(chat_request(hello("abc123"))).await;
        assert_eq!(status, StatusCode::OK);

        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("event: delta"));
        assert!(text.contains("Hi there"));
        assert!(text.contains("event: done"));

        let saved = h.state.sessions.load("abc123").unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].id(), Some("m1"));
        assert_eq!(saved[1].role, Role::Assistant);
        assert_eq!(saved[1].plain_text(), "Hi there");
        assert_eq!(saved[1].extra["metadata"]["model"], "test-model");

        let list = h.state.sessions.list().unwrap();
        assert_eq!(list[0].title, "Hello");
    }

    /// JSON payload of the first `event: done` block in an SSE body.
    fn done_payload(body: &str) -> serde_json::Value {
        let block = body
            .split("\n\n")
            .find(|b| b.lines().any(|l| l == "event: done"))
            .unwrap();
        let data = block
            .lines()
            .find_map(|l| l.strip_prefix("data:"))
            .unwrap();
        serde_json::from_str(data.trim_start()).unwrap()
    }

    #[tokio::test]
    async fn follow_up_turn_keeps_stored_reply_metadata() {
        let h = Harness::chatty();
        let first = hello("abc123");
        let (_, body) = h.send(chat_request(first.clone())).await;
        let done = done_payload(&String::from_utf8(body).unwrap());
        assert_eq!(done["id"], "abc123");
        assert_eq!(done["title"], "Hello");
        let reply = done["message"].clone();
        assert_eq!(reply["role"], "assistant");
        assert_eq!(reply["metadata"]["model"], "test-model");

        // the page sends back exactly what it was given
        let mut messages = first["messages"].as_array().unwrap().clone();
        messages.push(reply.clone());
        messages.push(json!({"id": "m2", "role": "user", "parts": [{"type": "text", "text": "Again"}]}));
        let (_, body) = h
            .send(chat_request(json!({"chatId": "abc123", "messages": messages})))
            .await;
        assert!(String::from_utf8(body).unwrap().contains("event: done"));

        let saved = h.state.sessions.load("abc123").unwrap();
        assert_eq!(saved.len(), 4);
        assert_eq!(saved[1].id(), reply["id"].as_str());
        assert_eq!(saved[1].extra["metadata"]["model"], "test-model");
        assert_eq!(saved[1].extra["metadata"]["finishReason"], "stop");
        assert_eq!(saved[3].role, Role::Assistant);
    }

    #[tokio::test]
    async fn model_failure_streams_error_and_saves_nothing() {
        let h = Harness::new(
            None,
            FixedEditor(Ok(ImageEditOutcome::Text("no".to_string()))),
        );
        let (status, body) = h.send(chat_request(hello("abc123"))).await;
        assert_eq!(status, StatusCode::OK);

        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("event: error"));
        assert!(text.contains("offline"));
        assert!(h.state.sessions.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_failure_is_reported_to_the_client() {
        let h = Harness::chatty();
        // a regular file where the chats directory should be
        std::fs::write(h.dir.path().join("chats"), b"not a dir").unwrap();

        let (_, body) = h.send(chat_request(hello("abc123"))).await;
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("Hi there"));
        assert!(text.contains("event: save-failed"));
        assert!(text.contains(super::SAVE_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn invalid_id_is_rejected_before_calling_the_model() {
        let h = Harness::chatty();
        let (status, body) = h.send(chat_request(hello(""))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(body["error"].as_str().unwrap().contains("invalid argument"));
        assert!(h.state.sessions.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transcript_without_user_message_is_rejected() {
        let h = Harness::chatty();
        let req = chat_request(json!({"chatId": "abc123", "messages": []}));
        let (status, _) = h.send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

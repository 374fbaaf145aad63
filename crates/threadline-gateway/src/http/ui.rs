use axum::response::Html;

static INDEX_HTML: &str = include_str!("../../static/index.html");

/// Serve the embedded web chat UI at `GET /` and `GET /chat/{id}`.
///
/// The page reads the chat id from its own URL.
pub async fn ui_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

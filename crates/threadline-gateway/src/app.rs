use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use threadline_agent::image::ImageEditor;
use threadline_agent::ChatRuntime;
use threadline_core::config::ThreadlineConfig;
use threadline_sessions::{SessionError, SessionManager, StorageFault};
use tower_http::services::ServeDir;

/// Uploads larger than this are rejected before the handler runs.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: ThreadlineConfig,
    pub sessions: SessionManager,
    pub chat: ChatRuntime,
    pub images: Box<dyn ImageEditor>,
}

impl AppState {
    pub fn new(
        config: ThreadlineConfig,
        sessions: SessionManager,
        chat: ChatRuntime,
        images: Box<dyn ImageEditor>,
    ) -> Self {
        Self {
            config,
            sessions,
            chat,
            images,
        }
    }

    /// Run a session store call on the blocking pool.
    ///
    /// Both backends do synchronous file or database I/O.
    pub async fn with_sessions<T, F>(self: &Arc<Self>, f: F) -> Result<T, SessionError>
    where
        F: FnOnce(&SessionManager) -> Result<T, SessionError> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&state.sessions))
            .await
            .unwrap_or_else(|e| {
                Err(SessionError::StorageUnavailable(StorageFault::Io(
                    std::io::Error::other(format!("session task failed: {e}")),
                )))
            })
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let edited_images = ServeDir::new(&state.config.image.output_dir);

    Router::new()
        .route("/", get(crate::http::ui::ui_handler))
        .route("/chat/{id}", get(crate::http::ui::ui_handler))
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/api/chats",
            get(crate::http::chats::list_chats).post(crate::http::chats::create_chat),
        )
        .route("/api/chats/{id}", get(crate::http::chats::get_chat))
        .route("/api/chat", post(crate::http::chat::chat_handler))
        .route("/api/image", post(crate::http::image::image_handler))
        .nest_service("/edited_images", edited_images)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use threadline_agent::image::{GeminiImageEditor, ImageEditOutcome, ImageEditRequest, ImageEditor};
use threadline_agent::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
use threadline_core::config::ThreadlineConfig;
use tracing::{info, warn};

mod app;
mod http;

#[derive(Parser)]
#[command(name = "threadline-gateway", version, about = "Chat sessions over HTTP")]
struct Cli {
    /// Path to threadline.toml (overrides THREADLINE_CONFIG).
    #[arg(long, short)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "threadline_gateway=info,threadline_sessions=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > THREADLINE_CONFIG env > ~/.threadline/threadline.toml
    let config_path = cli.config.or_else(|| std::env::var("THREADLINE_CONFIG").ok());
    let config = ThreadlineConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        ThreadlineConfig::default()
    });

    let deployment = config.deployment();
    info!(?deployment, "deployment detected");
    let sessions = threadline_sessions::SessionManager::from_config(&config.storage, deployment)?;

    let provider = build_provider(&config);
    let system = threadline_agent::prompt::load_system_prompt(config.agent.system_prompt_path.as_deref());
    let chat = threadline_agent::ChatRuntime::new(
        provider,
        system,
        config.agent.model.clone(),
        config.agent.max_tokens,
    );
    let images = build_image_editor(&config);

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(config, sessions, chat, images));
    let router = app::build_router(state);

    info!("Threadline gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

/// Chat model from config, falling back to `OPENAI_API_KEY`.
fn build_provider(config: &ThreadlineConfig) -> Box<dyn LlmProvider> {
    if let Some(ref openai) = config.providers.openai {
        info!("LLM provider: OpenAI ({})", openai.base_url);
        return Box::new(threadline_agent::openai::OpenAiProvider::new(
            openai.api_key.clone(),
            Some(openai.base_url.clone()),
        ));
    }
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        info!("LLM provider: OpenAI (from env)");
        return Box::new(threadline_agent::openai::OpenAiProvider::new(key, None));
    }
    warn!("No LLM provider configured, chat requests will fail");
    Box::new(NullProvider)
}

/// Image model from config, falling back to `GEMINI_API_KEY`.
fn build_image_editor(config: &ThreadlineConfig) -> Box<dyn ImageEditor> {
    if let Some(ref gemini) = config.providers.gemini {
        info!(model = %gemini.model, "image editor: Gemini ({})", gemini.base_url);
        return Box::new(GeminiImageEditor::new(
            gemini.api_key.clone(),
            Some(gemini.base_url.clone()),
            gemini.model.clone(),
        ));
    }
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        info!("image editor: Gemini (from env)");
        return Box::new(GeminiImageEditor::new(
            key,
            None,
            threadline_core::config::DEFAULT_IMAGE_MODEL.to_string(),
        ));
    }
    warn!("No image model configured, image edits will fail");
    Box::new(NullImageEditor)
}

/// Placeholder provider when no API key is available.
struct NullProvider;

#[async_trait::async_trait]
impl LlmProvider for NullProvider {
    fn name(&self) -> &str {
        "null"
    }
    async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        Err(ProviderError::Unavailable(
            "no LLM provider configured, set providers.openai.api_key or OPENAI_API_KEY".into(),
        ))
    }
}

struct NullImageEditor;

#[async_trait::async_trait]
impl ImageEditor for NullImageEditor {
    fn name(&self) -> &str {
        "null"
    }
    async fn edit(&self, _req: &ImageEditRequest) -> Result<ImageEditOutcome, ProviderError> {
        Err(ProviderError::Unavailable(
            "no image model configured, set providers.gemini.api_key or GEMINI_API_KEY".into(),
        ))
    }
}

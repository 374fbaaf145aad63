use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
/// Directory name used for per-session JSON files.
pub const CHAT_DIR_NAME: &str = ".chats";

/// Top-level config (threadline.toml + THREADLINE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadlineConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Where the process runs. `None` means "detect from the environment".
    #[serde(default)]
    pub deployment: Option<Deployment>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub image: ImageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Deployment environment. Drives the storage defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    /// Developer machine: sessions live as JSON files next to the process.
    #[default]
    Local,
    /// Managed host with an ephemeral filesystem: sessions go to SQLite.
    Hosted,
}

/// Which session store implementation backs the application.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Explicit backend. Falls back to the deployment default when unset.
    pub backend: Option<StorageBackend>,
    /// Directory for the file backend.
    pub dir: Option<String>,
    /// Database file for the sqlite backend.
    pub database: Option<String>,
}

impl StorageConfig {
    /// Backend to use once the deployment is known.
    pub fn backend_for(&self, deployment: Deployment) -> StorageBackend {
        self.backend.unwrap_or(match deployment {
            Deployment::Local => StorageBackend::File,
            Deployment::Hosted => StorageBackend::Sqlite,
        })
    }

    /// Directory holding `<id>.json` files.
    ///
    /// Hosted deployments only have a writable temp dir, so the default moves
    /// there; it does not survive restarts.
    pub fn chat_dir(&self, deployment: Deployment) -> PathBuf {
        if let Some(ref dir) = self.dir {
            return PathBuf::from(dir);
        }
        match deployment {
            Deployment::Local => PathBuf::from(".").join(CHAT_DIR_NAME),
            Deployment::Hosted => std::env::temp_dir().join(CHAT_DIR_NAME),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Optional file whose contents replace the built-in system prompt.
    pub system_prompt_path: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system_prompt_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    pub openai: Option<OpenAiProviderConfig>,
    pub gemini: Option<GeminiProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiProviderConfig {
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

/// Image-edit model endpoint (Google Generative Language API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiProviderConfig {
    pub api_key: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_image_model")]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Where edited images are written; served under `/edited_images`.
    #[serde(default = "default_image_output_dir")]
    pub output_dir: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_image_output_dir(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}
fn default_image_model() -> String {
    DEFAULT_IMAGE_MODEL.to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_image_output_dir() -> String {
    "./public/edited_images".to_string()
}
fn default_database_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".threadline").join("threadline.db")
}

impl ThreadlineConfig {
    /// Load config from a TOML file with THREADLINE_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `THREADLINE_STORAGE__BACKEND=sqlite` or
    /// `THREADLINE_PROVIDERS__OPENAI__API_KEY=sk-...`.
    ///
    /// A missing file is not an error: every section has defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("THREADLINE_").split("__")),
        )
    }

    /// Extract from an already-assembled figment (used by tests and `load`).
    pub fn from_figment(figment: Figment) -> crate::error::Result<Self> {
        figment
            .extract()
            .map_err(|e| crate::error::ThreadlineError::Config(e.to_string()))
    }

    /// Deployment in effect: explicit config, else `VERCEL` in the
    /// environment marks a hosted deployment.
    pub fn deployment(&self) -> Deployment {
        self.deployment.unwrap_or_else(|| {
            if std::env::var_os("VERCEL").is_some() {
                Deployment::Hosted
            } else {
                Deployment::Local
            }
        })
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.threadline/threadline.toml", home)
}

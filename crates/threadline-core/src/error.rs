use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThreadlineError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ThreadlineError {
    /// Short error code string for log fields.
    pub fn code(&self) -> &'static str {
        match self {
            ThreadlineError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ThreadlineError>;

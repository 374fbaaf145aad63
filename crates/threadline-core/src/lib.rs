pub mod config;
pub mod error;

pub use config::ThreadlineConfig;
pub use error::{Result, ThreadlineError};

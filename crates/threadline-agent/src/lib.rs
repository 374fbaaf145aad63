pub mod image;
pub mod openai;
pub mod prompt;
pub mod provider;
pub mod runtime;
pub mod stream;

pub use provider::{LlmProvider, ProviderError};
pub use runtime::ChatRuntime;
pub use stream::StreamEvent;

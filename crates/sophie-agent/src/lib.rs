pub mod anthropic;
pub mod pipeline;
pub mod provider;
pub mod retry;

pub use anthropic::AnthropicProvider;
pub use provider::{ChatMessage, CompletionError, CompletionProvider, CompletionRequest, Role};
pub use retry::{RetryPolicy, RetryingCompleter};

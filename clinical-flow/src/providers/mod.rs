//! Concrete [`InferenceClient`](crate::inference::InferenceClient) adapters.

pub mod chat_completions;
#[cfg(feature = "rig")]
pub mod openrouter;

pub use chat_completions::ChatCompletionsClient;
#[cfg(feature = "rig")]
pub use openrouter::OpenRouterClient;

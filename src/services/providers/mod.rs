/// Chat model provider abstraction
///
/// The recommendation flow only needs "send one prompt, get one reply". Each
/// vendor integration implements that behind [`ChatModel`] so handlers and
/// tests never depend on a particular HTTP API.
use crate::{error::AppResult, models::ModelReply};

pub mod gemini;

pub use gemini::GeminiProvider;

/// Sampling temperature used for every recommendation call
pub const DETERMINISTIC_TEMPERATURE: f32 = 0.0;

/// Trait for text-generation model providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    /// Send a single prompt and wait for the model's reply
    async fn invoke(&self, prompt: &str) -> AppResult<ModelReply>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

pub mod providers;
pub mod recommendations;

pub use providers::{ChatModel, GeminiProvider};

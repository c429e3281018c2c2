//! LLM backends
//!
//! - `OpenAiBackend`: Together AI and Groq chat completions
//! - `MockBackend`: scripted responses for tests

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::MockBackend;
pub use openai::{OpenAiBackend, GROQ_PROVIDER, TOGETHER_PROVIDER};
pub use traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError, Usage};

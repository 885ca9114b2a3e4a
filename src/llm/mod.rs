//! LLM 客户端抽象与实现（OpenAI 兼容 / Mock）+ token 预算

pub mod message;
pub mod mock;
pub mod openai;
pub mod tokens;
pub mod traits;

pub use message::{Message, Role};
pub use mock::{MockLlmClient, ScriptedReply};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::LlmClient;

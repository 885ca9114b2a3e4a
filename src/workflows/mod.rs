//! 单轮工作流：analyze / audit / generate
//!
//! 与 ReAct 流不同，这三个流程是一次性的 chat 调用：固定 system 提示词 +
//! 用户输入，消息整体裁剪到模型预算后发出。

pub mod analyze;
pub mod audit;
pub mod generate;

use std::sync::Arc;

use crate::error::AgentError;
use crate::llm::{tokens, LlmClient, Message};

pub use analyze::analysis_flow;
pub use audit::audit_flow;
pub use generate::generator_flow;

/// 跑一个单步工作流：system 提示词 + 一条用户消息
pub async fn simple_flow(
    llm: Arc<dyn LlmClient>,
    model: &str,
    max_tokens: u32,
    system_prompt: &str,
    instructions: String,
) -> Result<String, AgentError> {
    let messages = vec![Message::system(system_prompt), Message::user(instructions)];
    let messages = tokens::fit_messages(messages, model);

    llm.chat(model, max_tokens, &messages)
        .await
        .map_err(AgentError::LlmError)
}

//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：chat 为一次非流式完成，
//! 错误以 String 返回，由调用方映射为 AgentError。

use async_trait::async_trait;

use crate::llm::Message;

/// LLM 客户端 trait：指定模型与 max_tokens 的一次完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        model: &str,
        max_tokens: u32,
        messages: &[Message],
    ) -> Result<String, String>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

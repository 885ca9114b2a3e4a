//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（OPENAI_API_BASE 可配置）。
//! 被限流（429/500）时指数退避重试，初始 1s，最多 5 次。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

const DEFAULT_RETRIES: u32 = 5;
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：chat 时转 Message 为 API 格式并取首条 content
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    retries: u32,
    backoff: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    /// 从环境变量构建：OPENAI_API_KEY 必需，OPENAI_API_BASE 可选
    pub fn from_env() -> Result<Self, String> {
        let api_key =
            std::env::var("OPENAI_API_KEY").map_err(|_| "OPENAI_API_KEY is not set".to_string())?;
        let base_url = std::env::var("OPENAI_API_BASE").ok();
        Ok(Self::new(base_url.as_deref(), &api_key))
    }

    pub fn new(base_url: Option<&str>, api_key: &str) -> Self {
        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            retries: DEFAULT_RETRIES,
            backoff: DEFAULT_BACKOFF,
            usage: TokenUsage::new(),
        }
    }

    fn to_openai_messages(&self, messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>, String> {
        messages
            .iter()
            .map(|m| {
                let built = match m.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::System),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::User),
                    Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::Assistant),
                };
                built.map_err(|e| e.to_string())
            })
            .collect()
    }
}

/// 限流与服务端抖动可重试，鉴权等其余错误直接上抛
fn is_throttled(err_text: &str) -> bool {
    err_text.contains("429")
        || err_text.contains("500")
        || err_text.to_lowercase().contains("rate limit")
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn chat(
        &self,
        model: &str,
        max_tokens: u32,
        messages: &[Message],
    ) -> Result<String, String> {
        let api_messages = self.to_openai_messages(messages)?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .max_completion_tokens(max_tokens)
            .temperature(0.0)
            .messages(api_messages)
            .build()
            .map_err(|e| e.to_string())?;

        let mut backoff = self.backoff;
        let mut last_err = String::new();
        for _try in 0..self.retries {
            match self.client.chat().create(request.clone()).await {
                Ok(response) => {
                    if let Some(usage) = &response.usage {
                        self.usage
                            .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
                    }

                    let content = response
                        .choices
                        .first()
                        .and_then(|c| c.message.content.clone())
                        .unwrap_or_default();
                    return Ok(content);
                }
                Err(e) => {
                    let text = e.to_string();
                    if !is_throttled(&text) {
                        return Err(text);
                    }
                    tracing::warn!(error = %text, backoff_secs = backoff.as_secs(), "LLM throttled, backing off");
                    last_err = text;
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }

        Err(format!(
            "request throttled after retrying {} times: {}",
            self.retries, last_err
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_throttled() {
        assert!(is_throttled("HTTP status 429 Too Many Requests"));
        assert!(is_throttled("Rate limit exceeded"));
        assert!(!is_throttled("401 Unauthorized"));
        assert!(!is_throttled("invalid api key"));
    }

    #[test]
    fn test_token_usage_accumulates() {
        let usage = TokenUsage::new();
        usage.add(10, 5);
        usage.add(1, 2);
        assert_eq!(usage.get(), (11, 7, 18));
    }
}

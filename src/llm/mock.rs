//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 预置一组脚本化回复，每次 chat 按顺序弹出一条；可为单条回复设置延迟，
//! 用于验证超时路径。脚本耗尽后返回错误。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message};

/// 一条脚本化回复
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub reply: Result<String, String>,
    /// 回复前的人为延迟（默认 0）
    pub delay: Duration,
}

impl ScriptedReply {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            reply: Ok(text.into()),
            delay: Duration::ZERO,
        }
    }

    pub fn err(text: impl Into<String>) -> Self {
        Self {
            reply: Err(text.into()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Mock 客户端：按脚本顺序回复
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
}

impl MockLlmClient {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
        }
    }

    /// 便捷构造：全部为成功回复
    pub fn with_responses(texts: Vec<&str>) -> Self {
        Self::new(texts.into_iter().map(ScriptedReply::ok).collect())
    }

    /// 剩余未消费的脚本条数
    pub fn remaining(&self) -> usize {
        self.replies.lock().expect("mock lock poisoned").len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat(
        &self,
        _model: &str,
        _max_tokens: u32,
        _messages: &[Message],
    ) -> Result<String, String> {
        let next = self
            .replies
            .lock()
            .expect("mock lock poisoned")
            .pop_front();
        match next {
            Some(scripted) => {
                if !scripted.delay.is_zero() {
                    tokio::time::sleep(scripted.delay).await;
                }
                scripted.reply
            }
            None => Err("mock script exhausted".to_string()),
        }
    }
}

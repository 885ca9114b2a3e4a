//! 有界对话历史
//!
//! 保留最近 MAX_HISTORY_MESSAGES 条消息，超出时丢弃最旧部分；
//! 字符级的裁剪由 token 预算层负责，这里只做条数语义上的限制。

use crate::llm::Message;

/// 历史消息条数上限
pub const MAX_HISTORY_MESSAGES: usize = 20;

/// 对话历史：严格追加，随后可能被截尾，不会交错
#[derive(Debug, Clone, Default)]
pub struct ChatHistory {
    messages: Vec<Message>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.bound();
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
        self.bound();
    }

    /// 超出上限时仅保留最近 MAX_HISTORY_MESSAGES 条
    fn bound(&mut self) {
        if self.messages.len() > MAX_HISTORY_MESSAGES {
            let drop = self.messages.len() - MAX_HISTORY_MESSAGES;
            self.messages.drain(..drop);
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

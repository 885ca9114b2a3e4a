//! Token 预算：模型上下文上限、消息计数与裁剪
//!
//! 估算使用字符启发式（英文约 4 字符/token，CJK 约 1.5 字符/token），
//! 消息计数按 OpenAI 约定：每条消息 3 token 封装开销，署名额外 1 token，
//! 回复引导再加 3 token。fit_prompt 每轮丢弃前三分之一行直到放得下，
//! fit_messages 先收缩为 [system, 最后一条]，仍超限时只保留 system。

use crate::llm::Message;

/// 各模型的上下文 token 上限；未知模型按 8192 处理
fn token_limit_for(model: &str) -> usize {
    match model {
        "gpt-3.5-turbo" | "gpt-3.5-turbo-0301" | "gpt-3.5-turbo-0613" | "gpt-3.5-turbo-instruct" => {
            4096
        }
        "gpt-3.5-turbo-1106" | "gpt-3.5-turbo-16k" | "gpt-3.5-turbo-16k-0613" => 16385,
        "gpt-4" | "gpt-4-0314" | "gpt-4-0613" => 8192,
        "gpt-4-32k" | "gpt-4-32k-0314" | "gpt-4-32k-0613" => 32768,
        "gpt-4-1106-preview" | "gpt-4-vision-preview" | "gpt-4-turbo" => 128_000,
        "gpt-4o" | "gpt-4o-mini" | "o1-mini" => 128_000,
        "o1" | "o3" | "o3-mini" => 200_000,
        _ => 8192,
    }
}

/// 返回模型的最大上下文 token 数（模型名大小写不敏感）
pub fn token_limit(model: &str) -> usize {
    token_limit_for(&model.to_lowercase())
}

/// 估算文本的 token 数量
/// 英文按 4 字符/token，CJK 等非 ASCII 按 1.5 字符/token
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let mut ascii_chars = 0usize;
    let mut non_ascii_chars = 0usize;
    for c in text.chars() {
        if c.is_ascii() {
            ascii_chars += 1;
        } else {
            non_ascii_chars += 1;
        }
    }

    let tokens = ascii_chars / 4 + ((non_ascii_chars as f64) / 1.5).ceil() as usize;
    tokens.max(1)
}

/// 估算一组消息占用的 token 数
pub fn count_messages(messages: &[Message], _model: &str) -> usize {
    const TOKENS_PER_MESSAGE: usize = 3;
    const TOKENS_PER_NAME: usize = 1;

    let mut num_tokens = 0;
    for message in messages {
        num_tokens += TOKENS_PER_MESSAGE;
        num_tokens += estimate_tokens(&message.content);
        num_tokens += estimate_tokens(message.role.as_str());
        if let Some(name) = &message.name {
            num_tokens += estimate_tokens(name);
            num_tokens += TOKENS_PER_NAME;
        }
    }

    // 回复以 <|start|>assistant<|message|> 引导
    num_tokens + 3
}

/// 将长文本裁剪到模型上限内：每轮丢弃前三分之一的行
pub fn fit_prompt(prompt: &str, model: &str) -> String {
    let limit = token_limit(model);
    let mut prompt = prompt.to_string();

    loop {
        let probe = [Message::user(prompt.clone())];
        if count_messages(&probe, model) < limit {
            return prompt;
        }

        let lines: Vec<&str> = prompt.split('\n').collect();
        let drop = ((lines.len() as f64) / 3.0).ceil() as usize;
        prompt = lines[drop.min(lines.len())..].join("\n");

        if prompt.trim().is_empty() {
            return String::new();
        }
    }
}

/// 将消息列表收缩到模型上限内
///
/// 超限时先保留 [首条(system), 最后一条]，仍超限则只保留首条。
pub fn fit_messages(messages: Vec<Message>, model: &str) -> Vec<Message> {
    let limit = token_limit(model);
    let mut messages = messages;

    loop {
        if messages.is_empty() || count_messages(&messages, model) <= limit {
            return messages;
        }
        if messages.len() <= 1 {
            return messages;
        }

        if messages.len() > 2 {
            let last = messages.pop().expect("len > 2");
            let first = messages.swap_remove(0);
            messages = vec![first, last];
        } else {
            messages.truncate(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_limit_known_models() {
        assert_eq!(token_limit("gpt-4o"), 128_000);
        assert_eq!(token_limit("GPT-4"), 8192);
        assert_eq!(token_limit("o1"), 200_000);
        assert_eq!(token_limit("some-unknown-model"), 8192);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        let tokens = estimate_tokens("Hello, world! This is a test.");
        assert!(tokens > 0);
        assert!(tokens < 29); // 应该少于字符数
    }

    #[test]
    fn test_count_messages_overhead() {
        let messages = vec![Message::system("a"), Message::user("b")];
        // 每条 3 token 封装 + 角色与内容 + 3 token 回复引导
        assert!(count_messages(&messages, "gpt-4o") >= 9);
    }

    #[test]
    fn test_count_messages_with_name() {
        let mut named = Message::user("hello there friend");
        named.name = Some("ops".to_string());
        let without = count_messages(&[Message::user("hello there friend")], "gpt-4o");
        let with = count_messages(&[named], "gpt-4o");
        assert!(with > without);
    }

    #[test]
    fn test_fit_prompt_short_text_unchanged() {
        let prompt = "kubectl get pods\nkubectl get svc";
        assert_eq!(fit_prompt(prompt, "gpt-4o"), prompt);
    }

    #[test]
    fn test_fit_prompt_drops_leading_lines() {
        // 逐行构造一个远超 gpt-4 上限（8192 token）的文本
        let lines: Vec<String> = (0..4000)
            .map(|i| format!("line {} with a dozen words of padding to inflate size", i))
            .collect();
        let prompt = lines.join("\n");
        let fitted = fit_prompt(&prompt, "gpt-4");

        assert!(!fitted.is_empty());
        assert!(count_messages(&[Message::user(fitted.clone())], "gpt-4") < 8192);
        // 末尾行保留，开头行被丢弃
        assert!(fitted.contains("line 3999"));
        assert!(!fitted.contains("line 0 "));
    }

    #[test]
    fn test_fit_messages_keeps_system_and_latest() {
        let filler = "word ".repeat(40_000);
        let messages = vec![
            Message::system("system prompt"),
            Message::user(filler.clone()),
            Message::assistant(filler),
            Message::user("latest question"),
        ];
        let fitted = fit_messages(messages, "gpt-4");
        assert_eq!(fitted.len(), 2);
        assert_eq!(fitted[0].content, "system prompt");
        assert_eq!(fitted[1].content, "latest question");
    }

    #[test]
    fn test_fit_messages_falls_back_to_system_only() {
        let filler = "word ".repeat(40_000);
        let messages = vec![Message::system("system prompt"), Message::user(filler)];
        let fitted = fit_messages(messages, "gpt-4");
        assert_eq!(fitted.len(), 1);
        assert_eq!(fitted[0].content, "system prompt");
    }

    #[test]
    fn test_fit_messages_under_limit_unchanged() {
        let messages = vec![Message::system("s"), Message::user("u")];
        let fitted = fit_messages(messages.clone(), "gpt-4o");
        assert_eq!(fitted.len(), messages.len());
    }
}

//! 模型信封：LLM 每轮必须输出的 JSON 结构与容错解析
//!
//! 信封是模型的「提案」，PlanTracker 才是计划状态的权威。解析端宽容
//! （接受 ```json 围栏、<think> 前导、未知字段、缺省/非法 status），
//! 输出端严格按 schema 序列化。

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::OnceLock;

/// 步骤状态；非法或缺省值解码为 Pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    /// completed / failed 为终态，此后状态不再变化
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }
}

impl<'de> Deserialize<'de> for StepStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // 模型偶尔输出空串或自造状态名，一律按 pending 处理
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.trim().to_lowercase().as_str() {
            "in_progress" => StepStatus::InProgress,
            "completed" => StepStatus::Completed,
            "failed" => StepStatus::Failed,
            _ => StepStatus::Pending,
        })
    }
}

/// 步骤动作：(工具名, 工具输入)；name 为空表示该步骤无需工具
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepAction {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub input: String,
}

impl StepAction {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

/// 计划中的一个步骤
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepDetail {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub action: StepAction,
    #[serde(default)]
    pub observation: String,
    #[serde(default)]
    pub status: StepStatus,
}

impl StepDetail {
    pub fn has_action(&self) -> bool {
        !self.action.is_empty()
    }
}

/// 模型信封
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReactEnvelope {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub thought: String,
    #[serde(default)]
    pub steps: Vec<StepDetail>,
    /// 模型声称的当前步骤下标（有符号，越界/负值由 tracker 兜底）
    #[serde(default)]
    pub current_step_index: i64,
    #[serde(default)]
    pub final_answer: String,
}

/// 去掉开头的 ``` 围栏标记与可选的 json 标签、以及结尾围栏
fn strip_code_fence(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.strip_prefix("json").unwrap_or(rest);
        text = text.strip_suffix("```").unwrap_or(text);
        text = text.trim();
    }
    text
}

/// 丢弃 <think>...</think> 推理前导，保留其后的正文
fn strip_think_preamble(text: &str) -> &str {
    let text = text.trim();
    if text.starts_with("<think>") {
        if let Some((_, rest)) = text.split_once("</think>") {
            return rest.trim();
        }
        // 没有闭合标签，正文无从提取，留给 JSON 解析报错
    }
    text
}

/// 容错解析模型回复为信封
///
/// 依次剥掉围栏与 <think> 前导（两种包裹可任意组合），再严格 JSON 解码。
pub fn parse_envelope(text: &str) -> Result<ReactEnvelope, String> {
    let text = strip_code_fence(text.trim());
    let text = strip_think_preamble(text);
    let text = strip_code_fence(text);

    serde_json::from_str(text)
        .map_err(|e| format!("failed to parse LLM response to envelope: {}", e))
}

fn answer_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?i)(?:^|\n)(?:answer|conclusion|result|summary):?\s*(.+?)(?:\n\n|$)")
                .expect("answer pattern"),
            Regex::new(
                r"(?i)(?:^|\n)(?:finally|in conclusion|to summarize|in summary):?\s*(.+?)(?:\n\n|$)",
            )
            .expect("conclusion pattern"),
            Regex::new(
                r"(?i)(?:the solution is|the result is|the answer is|we found that):?\s*(.+?)(?:\n\n|$)",
            )
            .expect("inline answer pattern"),
        ]
    })
}

/// 从非结构化文本中尽力提取一个最终答案
///
/// 先匹配常见的 answer/conclusion 前缀，再匹配行内的 "the answer is" 句式，
/// 都失败时取最后一个段落。
pub fn extract_answer_from_text(text: &str) -> String {
    for pattern in answer_patterns() {
        if let Some(captures) = pattern.captures(text) {
            if let Some(m) = captures.get(1) {
                return m.as_str().trim().to_string();
            }
        }
    }

    text.split("\n\n")
        .last()
        .unwrap_or(text)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &str = r#"{"question":"q","thought":"t","steps":[{"name":"s1","description":"d1","status":"pending"}],"current_step_index":0,"final_answer":""}"#;

    #[test]
    fn test_parse_plain_json() {
        let envelope = parse_envelope(PLAIN).unwrap();
        assert_eq!(envelope.question, "q");
        assert_eq!(envelope.steps.len(), 1);
        assert_eq!(envelope.steps[0].status, StepStatus::Pending);
    }

    #[test]
    fn test_parse_fenced_json_equals_inner() {
        let fenced = format!("```json\n{}\n```", PLAIN);
        let inner = parse_envelope(PLAIN).unwrap();
        let outer = parse_envelope(&fenced).unwrap();
        assert_eq!(outer.question, inner.question);
        assert_eq!(outer.steps.len(), inner.steps.len());
    }

    #[test]
    fn test_parse_fence_without_json_tag() {
        let fenced = format!("```\n{}\n```", PLAIN);
        assert!(parse_envelope(&fenced).is_ok());
    }

    #[test]
    fn test_parse_think_preamble() {
        let wrapped = format!("<think>let me reason about pods...</think>\n{}", PLAIN);
        let envelope = parse_envelope(&wrapped).unwrap();
        assert_eq!(envelope.question, "q");
    }

    #[test]
    fn test_parse_think_then_fence() {
        let wrapped = format!("<think>reasoning</think>\n```json\n{}\n```", PLAIN);
        assert!(parse_envelope(&wrapped).is_ok());
    }

    #[test]
    fn test_parse_failure_has_reason() {
        let err = parse_envelope("Sorry, I cannot help with that.").unwrap_err();
        assert!(err.contains("failed to parse"));
    }

    #[test]
    fn test_unknown_fields_ignored_and_status_defaulted() {
        let text = r#"{"question":"q","steps":[{"name":"s","status":"doing","extra":1}],"model_note":"x"}"#;
        let envelope = parse_envelope(text).unwrap();
        assert_eq!(envelope.steps[0].status, StepStatus::Pending);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&StepStatus::InProgress).unwrap();
        assert_eq!(json, r#""in_progress""#);
    }

    #[test]
    fn test_extract_answer_inline() {
        assert_eq!(
            extract_answer_from_text("Sorry, I think the answer is 42."),
            "42."
        );
    }

    #[test]
    fn test_extract_answer_prefixed() {
        let text = "Some reasoning here.\nConclusion: the pod is OOMKilled\n\nTrailing.";
        assert_eq!(extract_answer_from_text(text), "the pod is OOMKilled");
    }

    #[test]
    fn test_extract_answer_last_paragraph_fallback() {
        let text = "first paragraph\n\nsecond paragraph";
        assert_eq!(extract_answer_from_text(text), "second paragraph");
    }
}

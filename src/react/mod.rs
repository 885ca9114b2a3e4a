//! ReAct 引擎：信封解析、计划跟踪、有界历史、提示词库与主循环

pub mod envelope;
pub mod flow;
pub mod history;
pub mod prompts;
pub mod tracker;

pub use envelope::{
    extract_answer_from_text, parse_envelope, ReactEnvelope, StepAction, StepDetail, StepStatus,
};
pub use flow::{ReactFlow, FALLBACK_RESPONSE};
pub use history::{ChatHistory, MAX_HISTORY_MESSAGES};
pub use tracker::PlanTracker;

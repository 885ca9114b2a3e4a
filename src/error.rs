//! Agent 错误类型
//!
//! 可恢复错误（工具失败 / 超时 / 解析失败）由 ReAct 循环转为 failed 步骤并继续；
//! 仅规划失败、整体超时与用户取消是致命错误。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 规划阶段失败（LLM 出错或无法从回复中提取任何计划）
    #[error("Planning failed: {0}")]
    PlanningFailed(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    /// 执行阶段超出 execution_timeout
    #[error("execution timed out after {0} seconds")]
    ExecutionTimeout(u64),

    /// 整次运行超出 60 分钟上限
    #[error("run timed out")]
    RunTimeout,

    #[error("Cancelled by user")]
    Cancelled,

    /// 计划执行走入死路且没有最终答案
    #[error("plan execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Kubernetes error: {0}")]
    KubernetesError(String),
}

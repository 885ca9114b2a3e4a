//! Kopilot - Kubernetes 运维助手
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **error**: AgentError 错误类型
//! - **kubernetes**: 集群 manifest 读写（kubectl 子进程）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）+ token 预算
//! - **react**: 信封解析、计划跟踪、提示词库与 ReAct 主循环
//! - **tools**: 工具箱（kubectl、trivy、python、search、MCP）与调度器
//! - **workflows**: 单轮工作流（analyze / audit / generate）

pub mod config;
pub mod error;
pub mod kubernetes;
pub mod llm;
pub mod react;
pub mod tools;
pub mod workflows;

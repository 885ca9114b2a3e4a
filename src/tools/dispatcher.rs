//! 工具调度器
//!
//! invoke(name, input) 把工具扔到独立任务中执行，结果经 oneshot 通道送回，
//! 与计划的执行超时赛跑；缺失 / 出错 / 超时统一转为给模型看的合成观察文本，
//! 成功输出裁剪到模型剩余 token 预算内。每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::llm::tokens;
use crate::tools::ToolRegistry;

/// 一次工具调用的观察结果；failed 表示该步骤应标记为 failed
#[derive(Debug, Clone)]
pub struct ToolObservation {
    pub text: String,
    pub failed: bool,
}

/// 工具调度器：持有注册表与模型名（用于输出裁剪）
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    model: String,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, model: impl Into<String>) -> Self {
        Self {
            registry,
            model: model.into(),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行指定工具，等待其完成或 timeout 到期
    pub async fn invoke(&self, name: &str, input: &str, timeout: Duration) -> ToolObservation {
        let Some(tool) = self.registry.get(name) else {
            let text = format!(
                "Tool {} is not available. Consider switching to other supported tools.",
                name
            );
            self.audit(name, "missing", false, Duration::ZERO);
            return ToolObservation { text, failed: true };
        };

        let start = Instant::now();
        let (result_tx, result_rx) = oneshot::channel();
        let owned_input = input.to_string();
        tokio::spawn(async move {
            let result = tool.invoke(&owned_input).await;
            // 接收端可能已因超时离开
            let _ = result_tx.send(result);
        });

        let observation = tokio::select! {
            received = result_rx => match received {
                Ok(Ok(output)) => {
                    let output = output.trim().to_string();
                    let text = if output.is_empty() {
                        "Empty result returned from the tool.".to_string()
                    } else {
                        output
                    };
                    self.audit(name, "ok", true, start.elapsed());
                    ToolObservation { text, failed: false }
                }
                Ok(Err(failure)) => {
                    let text = format!(
                        "Tool {} failed with result: {} error: {}. Consider refining the inputs for the tool.",
                        name, failure.output, failure.error
                    );
                    self.audit(name, "error", false, start.elapsed());
                    ToolObservation { text, failed: true }
                }
                Err(_) => {
                    let text = format!("Tool {} task aborted unexpectedly.", name);
                    self.audit(name, "aborted", false, start.elapsed());
                    ToolObservation { text, failed: true }
                }
            },
            _ = tokio::time::sleep(timeout) => {
                let text = format!(
                    "Tool {} execution timed out after {} seconds. Try with a simpler query or different tool.",
                    name,
                    timeout.as_secs()
                );
                self.audit(name, "timeout", false, start.elapsed());
                ToolObservation { text, failed: true }
            }
        };

        // 工具可能产生超长输出，裁剪到模型上下文预算内
        ToolObservation {
            text: tokens::fit_prompt(&observation.text, &self.model),
            failed: observation.failed,
        }
    }

    fn audit(&self, tool: &str, outcome: &str, ok: bool, duration: Duration) {
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration.as_millis() as u64,
        });
        tracing::info!(audit = %audit, "tool");
    }
}

//! python 工具：通过外部解释器执行短脚本
//!
//! 输入为 Python 源码（python3 -c），输出为脚本的 stdout/stderr。

use async_trait::async_trait;
use tokio::process::Command;

use crate::tools::{Tool, ToolFailure};

pub struct PythonTool;

#[async_trait]
impl Tool for PythonTool {
    fn name(&self) -> &str {
        "python"
    }

    fn description(&self) -> &str {
        "Execute Python code in a REPL environment"
    }

    fn input_schema(&self) -> &str {
        "Python code in string format to execute"
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolFailure> {
        let output = Command::new("python3")
            .args(["-c", input])
            .output()
            .await
            .map_err(|e| ToolFailure::error(format!("failed to run python3: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = format!("{}\n{}", stdout.trim(), stderr.trim())
            .trim()
            .to_string();

        if !output.status.success() {
            return Err(ToolFailure::new(
                combined,
                format!("exit status {}", output.status.code().unwrap_or(-1)),
            ));
        }
        Ok(combined)
    }
}

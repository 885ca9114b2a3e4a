//! trivy 工具：扫描容器镜像漏洞
//!
//! 输入为镜像名；模型偶尔会把整条命令塞进来，这里剥掉 "trivy " / "image " 前缀。

use async_trait::async_trait;
use tokio::process::Command;

use crate::tools::{Tool, ToolFailure};

pub struct TrivyTool;

#[async_trait]
impl Tool for TrivyTool {
    fn name(&self) -> &str {
        "trivy"
    }

    fn description(&self) -> &str {
        "Scan container images for vulnerabilities using Trivy"
    }

    fn input_schema(&self) -> &str {
        "Container image in string format to scan"
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolFailure> {
        let mut image = input.trim();
        image = image.strip_prefix("trivy ").unwrap_or(image).trim();
        image = image.strip_prefix("image ").unwrap_or(image).trim();

        let output = Command::new("trivy")
            .args(["image", image, "--scanners", "vuln"])
            .output()
            .await
            .map_err(|e| ToolFailure::error(format!("failed to run trivy: {}", e)))?;

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

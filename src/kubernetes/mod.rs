//! 集群 manifest 读写：经 kubectl 子进程 get / apply
//!
//! analyze 用 get_yaml 抓取资源清单，generate 在用户确认后用 apply_yaml 落地。

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::AgentError;
use crate::tools::kubectl::run_kubectl;

/// 抓取指定资源的 YAML
pub async fn get_yaml(resource: &str, name: &str, namespace: &str) -> Result<String, AgentError> {
    let command = format!("get {} {} -n {} -o yaml", resource, name, namespace);
    run_kubectl(&command)
        .await
        .map_err(|e| AgentError::KubernetesError(format!("{} ({})", e.output, e.error)))
}

/// 将 manifest 应用到集群（kubectl apply -f -，manifest 经 stdin 传入）
pub async fn apply_yaml(manifests: &str) -> Result<String, AgentError> {
    let mut child = Command::new("kubectl")
        .args(["apply", "-f", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AgentError::KubernetesError(format!("failed to run kubectl apply: {}", e)))?;

    if let Some(stdin) = child.stdin.as_mut() {
        stdin
            .write_all(manifests.as_bytes())
            .await
            .map_err(|e| AgentError::KubernetesError(format!("failed to pipe manifests: {}", e)))?;
    }
    drop(child.stdin.take());

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| AgentError::KubernetesError(format!("kubectl apply failed: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(AgentError::KubernetesError(format!(
            "kubectl apply exited with {}: {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )));
    }

    Ok(format!("{}\n{}", stdout.trim(), stderr.trim()).trim().to_string())
}

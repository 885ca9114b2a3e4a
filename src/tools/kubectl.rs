//! kubectl 工具：对集群执行单条 kubectl 命令
//!
//! 去掉开头的 "kubectl" 前缀；拒绝交互式子命令（edit）；
//! 参数切分尊重引号，不经过 shell，不支持管道与重定向。

use async_trait::async_trait;
use tokio::process::Command;

use crate::tools::{Tool, ToolFailure};

/// 把命令串切成参数，成对的单双引号内的空格不作分隔
pub fn split_command_args(command: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quote_char = '\0';

    for ch in command.chars() {
        match ch {
            '\'' | '"' => {
                if in_quotes && ch == quote_char {
                    in_quotes = false;
                    quote_char = '\0';
                } else if !in_quotes {
                    in_quotes = true;
                    quote_char = ch;
                } else {
                    current.push(ch);
                }
            }
            ' ' if !in_quotes => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }
    args
}

/// 执行一条 kubectl 命令，返回 trim 过的合并输出
pub async fn run_kubectl(command: &str) -> Result<String, ToolFailure> {
    let command = command
        .trim()
        .strip_prefix("kubectl")
        .map(str::trim)
        .unwrap_or_else(|| command.trim());

    if command.starts_with("edit") {
        return Err(ToolFailure::error(
            "interactive command kubectl edit is not supported",
        ));
    }

    let args = split_command_args(command);
    let output = Command::new("kubectl")
        .args(&args)
        .output()
        .await
        .map_err(|e| ToolFailure::error(format!("failed to run kubectl: {}", e)))?;

    let combined = combine_output(&output.stdout, &output.stderr);
    if !output.status.success() {
        return Err(ToolFailure::new(
            combined,
            format!("exit status {}", output.status.code().unwrap_or(-1)),
        ));
    }

    Ok(combined)
}

fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    let mut combined = String::new();
    combined.push_str(stdout.trim());
    if !stderr.trim().is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(stderr.trim());
    }
    combined
}

pub struct KubectlTool;

#[async_trait]
impl Tool for KubectlTool {
    fn name(&self) -> &str {
        "kubectl"
    }

    fn description(&self) -> &str {
        "Execute kubectl commands against a Kubernetes cluster."
    }

    fn input_schema(&self) -> &str {
        "kubectl command in string format to execute. Ensure command is a single kubectl and shell pipe (|) and redirect (>) are not supported."
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolFailure> {
        run_kubectl(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_args() {
        assert_eq!(
            split_command_args("get pods -n default"),
            vec!["get", "pods", "-n", "default"]
        );
    }

    #[test]
    fn test_split_respects_quotes() {
        let args = split_command_args(
            r#"patch node k8s-node-1 -p '{"spec":{"unschedulable":true}}'"#,
        );
        assert_eq!(args[0], "patch");
        assert_eq!(args.last().unwrap(), r#"{"spec":{"unschedulable":true}}"#);
    }

    #[test]
    fn test_split_mixed_quote_kinds() {
        let args = split_command_args(r#"annotate pod a note="it's fine""#);
        assert_eq!(args.last().unwrap(), "note=it's fine");
    }

    #[tokio::test]
    async fn test_edit_is_denied() {
        let err = run_kubectl("kubectl edit deploy/web").await.unwrap_err();
        assert!(err.error.contains("edit is not supported"));

        let err = run_kubectl("edit pod my-pod").await.unwrap_err();
        assert!(err.error.contains("edit is not supported"));
    }
}

//! MCP 动态工具：从外部 MCP 服务器加载工具定义并注册
//!
//! 配置为 JSON（mcpServers 映射，支持 stdio 命令或 URL 传输）。
//! 传输层由外部提供方实现（McpProvider trait）；这里负责解析配置、
//! 按 "{服务器名}_{工具名}" 前缀生成唯一工具名并注册到 ToolRegistry。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::tools::{Tool, ToolFailure, ToolRegistry};

/// MCP 配置文件根：服务器名 -> 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct McpConfig {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: HashMap<String, McpServer>,
}

/// 单个 MCP 服务器的配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpServer {
    #[serde(rename = "type", default)]
    pub server_type: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// 请求超时（秒）
    #[serde(default)]
    pub timeout: u64,
}

impl McpServer {
    /// 校验传输配置：stdio 需要 command，否则需要 url
    pub fn validate(&self, name: &str) -> Result<(), String> {
        if self.command.is_empty() && self.url.is_empty() {
            return Err(format!("no command or URL specified for {}", name));
        }
        Ok(())
    }
}

/// 从文件加载 MCP 配置
pub fn load_mcp_config(path: &Path) -> Result<McpConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read config file: {}", e))?;
    let config: McpConfig =
        serde_json::from_str(&content).map_err(|e| format!("failed to parse config file: {}", e))?;
    for (name, server) in &config.mcp_servers {
        server.validate(name)?;
    }
    Ok(config)
}

/// 一个远端工具的元信息
#[derive(Debug, Clone)]
pub struct McpToolSpec {
    pub name: String,
    pub description: String,
    /// 工具的 JSON Schema 文本
    pub input_schema: String,
}

/// MCP 传输提供方：初始化后列出工具并代理调用
#[async_trait]
pub trait McpProvider: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<McpToolSpec>, String>;
    async fn call_tool(&self, name: &str, input: &str) -> Result<String, String>;
}

/// 注册到 ToolRegistry 的 MCP 工具包装
pub struct McpTool {
    /// 带服务器前缀的唯一名
    prefixed_name: String,
    /// 远端原始工具名
    remote_name: String,
    description: String,
    input_schema: String,
    provider: Arc<dyn McpProvider>,
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.prefixed_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> &str {
        &self.input_schema
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolFailure> {
        self.provider
            .call_tool(&self.remote_name, input)
            .await
            .map_err(|e| ToolFailure::error(format!("failed to call tool {}: {}", self.remote_name, e)))
    }
}

/// 列出提供方的工具并以 "{server}_{tool}" 名注册；返回注册的工具名
pub async fn register_mcp_tools(
    registry: &mut ToolRegistry,
    server_name: &str,
    provider: Arc<dyn McpProvider>,
) -> Result<Vec<String>, String> {
    let specs = provider.list_tools().await?;
    let mut registered = Vec::with_capacity(specs.len());

    for spec in specs {
        let prefixed_name = format!("{}_{}", server_name, spec.name);
        registry.register_arc(Arc::new(McpTool {
            prefixed_name: prefixed_name.clone(),
            remote_name: spec.name,
            description: spec.description,
            input_schema: format!("JSON Schema: {}", spec.input_schema),
            provider: provider.clone(),
        }));
        registered.push(prefixed_name);
    }

    tracing::info!(server = server_name, tools = ?registered, "Enabled MCP tools");
    Ok(registered)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider;

    #[async_trait]
    impl McpProvider for StaticProvider {
        async fn list_tools(&self) -> Result<Vec<McpToolSpec>, String> {
            Ok(vec![McpToolSpec {
                name: "lint".to_string(),
                description: "Lint a manifest".to_string(),
                input_schema: r#"{"type":"object"}"#.to_string(),
            }])
        }

        async fn call_tool(&self, name: &str, input: &str) -> Result<String, String> {
            Ok(format!("{} <- {}", name, input))
        }
    }

    #[tokio::test]
    async fn test_register_prefixes_tool_names() {
        let mut registry = ToolRegistry::new();
        let names = register_mcp_tools(&mut registry, "k8s", Arc::new(StaticProvider))
            .await
            .unwrap();
        assert_eq!(names, vec!["k8s_lint".to_string()]);

        let tool = registry.get("k8s_lint").unwrap();
        assert!(tool.input_schema().starts_with("JSON Schema:"));
        assert_eq!(tool.invoke("deploy.yaml").await.unwrap(), "lint <- deploy.yaml");
    }

    #[test]
    fn test_mcp_config_parsing() {
        let raw = r#"{
            "mcpServers": {
                "files": {"command": "mcp-files", "args": ["--root", "/tmp"], "env": {"A": "1"}},
                "remote": {"type": "sse", "url": "https://example.com/sse", "timeout": 30}
            }
        }"#;
        let config: McpConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.mcp_servers.len(), 2);
        assert_eq!(config.mcp_servers["files"].command, "mcp-files");
        assert_eq!(config.mcp_servers["remote"].timeout, 30);
        assert!(config.mcp_servers["files"].validate("files").is_ok());
    }

    #[test]
    fn test_mcp_server_requires_transport() {
        let server = McpServer::default();
        assert!(server.validate("broken").is_err());
    }
}

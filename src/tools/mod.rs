//! 工具箱：注册表、调度器与内建工具（kubectl / trivy / python / search / MCP）

pub mod dispatcher;
pub mod kubectl;
pub mod mcp;
pub mod mcp_stdio;
pub mod python;
pub mod registry;
pub mod search;
pub mod trivy;

pub use dispatcher::{ToolDispatcher, ToolObservation};
pub use kubectl::KubectlTool;
pub use mcp::{load_mcp_config, register_mcp_tools, McpConfig, McpProvider, McpServer, McpToolSpec};
pub use mcp_stdio::StdioMcpProvider;
pub use python::PythonTool;
pub use registry::{Tool, ToolFailure, ToolRegistry};
pub use search::GoogleSearchTool;
pub use trivy::TrivyTool;

/// 按默认约定装配注册表：kubectl / trivy / python 常驻，search 按环境变量启用
pub fn default_registry(disable_kubectl: bool) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    if !disable_kubectl {
        registry.register(KubectlTool);
    }
    registry.register(TrivyTool);
    registry.register(PythonTool);
    if let Some(search) = GoogleSearchTool::from_env() {
        registry.register(search);
    }
    registry
}

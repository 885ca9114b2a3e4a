//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / input_schema / invoke），
//! 由 ToolRegistry 按名注册与查找；ToolDispatcher 在调用时加超时并统一
//! 生成观察文本。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

/// 工具失败：输出与错误分开携带，便于拼观察文本
#[derive(Debug, Clone, Default)]
pub struct ToolFailure {
    /// 失败时工具已产生的输出（如命令的 stderr）
    pub output: String,
    /// 错误本身（如退出码或异常信息）
    pub error: String,
}

impl ToolFailure {
    pub fn new(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: error.into(),
        }
    }

    /// 无输出的纯错误
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            error: error.into(),
        }
    }
}

/// 工具 trait：名称、描述与输入说明（供 LLM 选择）、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> &str;
    async fn invoke(&self, input: &str) -> Result<String, ToolFailure>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn remove(&mut self, name: &str) {
        self.tools.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 渲染提示词中的 Available Tools 段落（按名称排序保证稳定）
    pub fn tool_prompt(&self) -> String {
        let mut out = String::new();
        for name in self.tool_names() {
            let tool = &self.tools[&name];
            out.push_str(&format!(
                "- {}: {}, input schema: {}\n",
                name,
                tool.description(),
                tool.input_schema()
            ));
        }
        out
    }
}

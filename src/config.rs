//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `KOPILOT__*` 覆盖
//! （双下划线表示嵌套，如 `KOPILOT__LLM__MODEL=gpt-4o-mini`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub react: ReactSection,
    #[serde(default)]
    pub tools: ToolsSection,
}

/// [llm] 段：模型与端点
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    /// OpenAI 兼容端点；未设置时使用 OPENAI_API_BASE 或官方端点
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
            max_tokens: default_max_tokens(),
        }
    }
}

/// [react] 段：循环边界
#[derive(Debug, Clone, Deserialize)]
pub struct ReactSection {
    /// 执行循环最大迭代数
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// 执行阶段超时（秒）
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
}

fn default_max_iterations() -> usize {
    30
}

fn default_execution_timeout_secs() -> u64 {
    30 * 60
}

impl Default for ReactSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            execution_timeout_secs: default_execution_timeout_secs(),
        }
    }
}

/// [tools] 段：内建工具开关与 MCP 配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToolsSection {
    /// 禁用 kubectl 工具（只读演示等场景）
    #[serde(default)]
    pub disable_kubectl: bool,
    /// MCP 配置文件路径（JSON，mcpServers 映射）
    pub mcp_config: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 KOPILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 KOPILOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("KOPILOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

//! MCP stdio 传输：子进程 + 换行分隔的 JSON-RPC 2.0
//!
//! 启动配置中的命令，经 stdin/stdout 交换 initialize / tools/list / tools/call。
//! SSE 与 streamable HTTP 传输不在此实现。

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::tools::mcp::{McpProvider, McpServer, McpToolSpec};

const PROTOCOL_VERSION: &str = "2024-11-05";
const INIT_TIMEOUT: Duration = Duration::from_secs(180);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

struct StdioChannel {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// 基于子进程 stdio 的 MCP 提供方
pub struct StdioMcpProvider {
    channel: Mutex<StdioChannel>,
    next_id: AtomicU64,
    call_timeout: Duration,
    /// list_tools 时记录的各工具 inputSchema，call 时用于参数兜底
    schemas: std::sync::Mutex<HashMap<String, Value>>,
}

impl StdioMcpProvider {
    /// 启动服务器进程并完成 initialize 握手
    pub async fn connect(server: &McpServer) -> Result<Self, String> {
        if server.command.is_empty() {
            return Err("stdio transport requires a command".to_string());
        }

        let mut command = Command::new(&server.command);
        command
            .args(&server.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &server.env {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|e| format!("failed to start {}: {}", server.command, e))?;
        let stdin = child.stdin.take().ok_or("missing child stdin")?;
        let stdout = BufReader::new(child.stdout.take().ok_or("missing child stdout")?);

        let call_timeout = if server.timeout > 0 {
            Duration::from_secs(server.timeout)
        } else {
            DEFAULT_CALL_TIMEOUT
        };

        let provider = Self {
            channel: Mutex::new(StdioChannel { child, stdin, stdout }),
            next_id: AtomicU64::new(1),
            call_timeout,
            schemas: std::sync::Mutex::new(HashMap::new()),
        };

        provider
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {"name": "kopilot", "version": env!("CARGO_PKG_VERSION")},
                }),
                INIT_TIMEOUT,
            )
            .await
            .map_err(|e| format!("failed to initialize: {}", e))?;
        provider.notify("notifications/initialized").await?;

        Ok(provider)
    }

    async fn request(&self, method: &str, params: Value, timeout: Duration) -> Result<Value, String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});

        let mut channel = self.channel.lock().await;
        let line = format!("{}\n", payload);
        channel
            .stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| format!("write failed: {}", e))?;
        channel.stdin.flush().await.map_err(|e| e.to_string())?;

        // 逐行读取直到匹配本次请求 id（服务器可能穿插通知）
        let read_reply = async {
            loop {
                let mut line = String::new();
                let read = channel
                    .stdout
                    .read_line(&mut line)
                    .await
                    .map_err(|e| format!("read failed: {}", e))?;
                if read == 0 {
                    return Err("server closed the connection".to_string());
                }
                let message: Value = match serde_json::from_str(line.trim()) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                if message.get("id").and_then(Value::as_u64) != Some(id) {
                    continue;
                }
                if let Some(error) = message.get("error") {
                    return Err(error.to_string());
                }
                return Ok(message.get("result").cloned().unwrap_or(Value::Null));
            }
        };

        tokio::time::timeout(timeout, read_reply)
            .await
            .map_err(|_| format!("{} timed out after {:?}", method, timeout))?
    }

    async fn notify(&self, method: &str) -> Result<(), String> {
        let payload = json!({"jsonrpc": "2.0", "method": method});
        let mut channel = self.channel.lock().await;
        let line = format!("{}\n", payload);
        channel
            .stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| format!("write failed: {}", e))?;
        channel.stdin.flush().await.map_err(|e| e.to_string())
    }

    /// 关闭子进程
    pub async fn shutdown(&self) {
        let mut channel = self.channel.lock().await;
        let _ = channel.child.kill().await;
    }
}

/// 把 LLM 给的纯文本输入转为工具参数对象
///
/// 能解析成 JSON 对象则原样使用；否则塞进 schema 的第一个必填字段，
/// 都没有时用 "input" 字段兜底。
fn input_to_arguments(input: &str, schema: &Value) -> Value {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(input) {
        return Value::Object(map);
    }

    let key = schema
        .get("required")
        .and_then(Value::as_array)
        .and_then(|required| required.first())
        .and_then(Value::as_str)
        .unwrap_or("input");
    json!({ key: input })
}

#[async_trait]
impl McpProvider for StdioMcpProvider {
    async fn list_tools(&self) -> Result<Vec<McpToolSpec>, String> {
        let result = self
            .request("tools/list", json!({}), self.call_timeout)
            .await
            .map_err(|e| format!("failed to list tools: {}", e))?;

        let tools = result
            .get("tools")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut specs = Vec::with_capacity(tools.len());
        let mut schemas = self.schemas.lock().expect("schema lock poisoned");
        for tool in tools {
            let Some(name) = tool.get("name").and_then(Value::as_str).map(str::to_string) else {
                continue;
            };
            let description = tool
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let schema = tool.get("inputSchema").cloned().unwrap_or(Value::Null);
            schemas.insert(name.clone(), schema.clone());
            specs.push(McpToolSpec {
                name,
                description,
                input_schema: schema.to_string(),
            });
        }
        Ok(specs)
    }

    async fn call_tool(&self, name: &str, input: &str) -> Result<String, String> {
        let schema = self
            .schemas
            .lock()
            .expect("schema lock poisoned")
            .get(name)
            .cloned()
            .unwrap_or(Value::Null);
        let arguments = input_to_arguments(input, &schema);
        let result = self
            .request(
                "tools/call",
                json!({"name": name, "arguments": arguments}),
                self.call_timeout,
            )
            .await?;

        let contents = result
            .get("content")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let texts: Vec<String> = contents
            .iter()
            .filter(|c| c.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|c| c.get("text").and_then(Value::as_str).map(str::to_string))
            .collect();
        Ok(texts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_to_arguments_json_object_passthrough() {
        let args = input_to_arguments(r#"{"path": "/tmp"}"#, &Value::Null);
        assert_eq!(args["path"], "/tmp");
    }

    #[test]
    fn test_input_to_arguments_plain_text_uses_required_key() {
        let schema = json!({"required": ["query"]});
        let args = input_to_arguments("list pods", &schema);
        assert_eq!(args["query"], "list pods");
    }

    #[test]
    fn test_input_to_arguments_fallback_key() {
        let args = input_to_arguments("plain text", &Value::Null);
        assert_eq!(args["input"], "plain text");
    }
}

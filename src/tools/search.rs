//! search 工具：Google Custom Search
//!
//! 仅当 GOOGLE_API_KEY 与 GOOGLE_CSE_ID 均已配置时注册；
//! 结果拼为每行 "标题: 摘要" 的纯文本。

use async_trait::async_trait;
use serde::Deserialize;

use crate::tools::{Tool, ToolFailure};

const SEARCH_ENDPOINT: &str = "https://customsearch.googleapis.com/customsearch/v1";
const SEARCH_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

pub struct GoogleSearchTool {
    client: reqwest::Client,
    api_key: String,
    cse_id: String,
}

impl GoogleSearchTool {
    pub fn new(api_key: impl Into<String>, cse_id: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.into(),
            cse_id: cse_id.into(),
        }
    }

    /// 两个环境变量齐备时返回实例，否则 None（工具不注册）
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY").ok()?;
        let cse_id = std::env::var("GOOGLE_CSE_ID").ok()?;
        if api_key.is_empty() || cse_id.is_empty() {
            return None;
        }
        Some(Self::new(api_key, cse_id))
    }
}

#[async_trait]
impl Tool for GoogleSearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the web using Google"
    }

    fn input_schema(&self) -> &str {
        "Search query in string format"
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolFailure> {
        let response = self
            .client
            .get(SEARCH_ENDPOINT)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cse_id.as_str()),
                ("q", input),
            ])
            .send()
            .await
            .map_err(|e| ToolFailure::error(format!("search request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolFailure::new(body, format!("http status {}", status)));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ToolFailure::error(format!("invalid search response: {}", e)))?;

        let mut results = String::new();
        for item in parsed.items {
            results.push_str(&format!("{}: {}\n", item.title, item.snippet));
        }
        Ok(results)
    }
}

//! generate：根据指令生成 Kubernetes YAML manifest

use std::sync::Arc;

use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::workflows::simple_flow;

const GENERATE_PROMPT: &str = r#"As a skilled technical specialist in Kubernetes and cloud-native technologies, your task is to create Kubernetes YAML manifests by following these detailed steps:

1. Review the instructions provided to generate Kubernetes YAML manifests. Ensure that these manifests adhere to current security protocols and best practices. If an instruction lacks a specific image, choose the most commonly used one from reputable sources.
2. Utilize your expertise to scrutinize the YAML manifests. Conduct a thorough step-by-step analysis to identify any issues. Resolve these issues, ensuring the YAML manifests are accurate and secure.
3. After fixing and verifying the manifests, compile them in their raw form. For multiple YAML files, use '---' as a separator.

# Output Format

- Present only the final YAML manifests in raw format, separated by "---" for multiple files.
- Exclude any comments or additional annotations within the YAML files.

Your expertise ensures these manifests are not only functional but also compliant with the highest standards in Kubernetes and cloud-native technologies.
"#;

/// 根据自然语言指令生成 manifest（原始 YAML 文本）
pub async fn generator_flow(
    llm: Arc<dyn LlmClient>,
    model: &str,
    max_tokens: u32,
    instructions: String,
) -> Result<String, AgentError> {
    let result = simple_flow(llm, model, max_tokens, GENERATE_PROMPT, instructions).await?;
    Ok(strip_yaml_fence(&result))
}

/// 模型偶尔会把 YAML 包进 ``` 围栏，剥掉以便直接 apply
fn strip_yaml_fence(text: &str) -> String {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.strip_prefix("yaml").unwrap_or(rest);
        let rest = rest.strip_suffix("```").unwrap_or(rest);
        return rest.trim().to_string();
    }
    text.to_string()
}

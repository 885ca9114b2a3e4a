//! audit：对指定 Pod 做结构化安全审计

use std::sync::Arc;

use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::workflows::simple_flow;

const AUDIT_PROMPT: &str = r#"Conduct a structured security audit of a Kubernetes environment using a Chain of Thought (CoT) approach, ensuring each technical step is clearly connected to solutions with easy-to-understand explanations.

## Plan of Action

**1. Security Auditing:**
   - **Analyze the Pod YAML for Misconfigurations:**
      - Look for common security misconfigurations or risky settings within the YAML.
      - Connect issues to relatable concepts for non-technical users (e.g., likening insecure settings to an unlocked door).

**2. Vulnerability Review:**
   - Review the container images in use and their known weak points.
   - Summarize vulnerability findings with CVE numbers, severity, and descriptions when available.

**3. Issue Identification and Solution Formulation:**
   - Document each issue clearly and concisely.
   - Provide the recommendations to fix each issue.

## Provide the output in structured markdown, using clear and concise language.

Example output:

	## 1. <title of the issue or potential problem>

	- **Findings**: The YAML configuration doesn't specify the memory limit for the pod.
	- **How to resolve**: Set memory limit in Pod spec.

# Notes

- Keep your language concise and simple.
- Ensure key points are included, e.g. CVE number, error code, versions.
- Relatable analogies should help in visualizing the problem and solution.
- Ensure explanations are self-contained, enough for newcomers without previous technical exposure to understand.
"#;

/// 审计指定 Pod：输入为提前抓取的 Pod YAML
pub async fn audit_flow(
    llm: Arc<dyn LlmClient>,
    model: &str,
    max_tokens: u32,
    namespace: &str,
    name: &str,
    pod_yaml: String,
) -> Result<String, AgentError> {
    let instructions = format!(
        "Audit pod {} in namespace {}.\n\nPod YAML:\n\n{}",
        name, namespace, pod_yaml
    );
    simple_flow(llm, model, max_tokens, AUDIT_PROMPT, instructions).await
}

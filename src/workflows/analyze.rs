//! analyze：分析给定的 Kubernetes manifest，输出问题与修复建议

use std::sync::Arc;

use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::workflows::simple_flow;

const ANALYSIS_PROMPT: &str = r#"As an expert on Kubernetes, your task is analyzing the given Kubernetes manifests, figure out the issues and provide solutions in a human-readable format.
For each identified issue, document the analysis and solution in everyday language, employing simple analogies to clarify technical points.

# Steps

1. **Identify Clues**: Treat each piece of YAML configuration data like a clue in a mystery. Explain how it helps to understand the issue, similar to a detective piecing together a case.
2. **Analysis with Analogies**: Translate your technical findings into relatable scenarios. Use everyday analogies to explain concepts, avoiding complex jargon. This makes episodes like 'pod failures' or 'service disruptions' simple to grasp.
3. **Solution as a DIY Guide**: Offer a step-by-step solution akin to guiding someone through a household fix-up. Instructions should be straightforward, logical, and accessible.
4. **Document Findings**:
   - Separate analysis and solution clearly for each issue, detailing them in non-technical language.

# Output Format

Provide the output in structured markdown, using clear and concise language.

# Examples

## 1. <title of the issue or potential problem>

- **Findings**: The YAML configuration doesn't specify the memory limit for the pod.
- **How to resolve**: Set memory limit in Pod spec.

# Notes

- Keep your language concise and simple.
- Ensure key points are included, e.g. CVE number, error code, versions.
- Relatable analogies should help in visualizing the problem and solution.
- Ensure explanations are self-contained, enough for newcomers without previous technical exposure to understand.
"#;

/// 分析 manifest 并给出人类可读的问题与解法
pub async fn analysis_flow(
    llm: Arc<dyn LlmClient>,
    model: &str,
    max_tokens: u32,
    manifest: String,
) -> Result<String, AgentError> {
    let instructions = format!("Kubernetes manifest to analyze:\n\n{}", manifest);
    simple_flow(llm, model, max_tokens, ANALYSIS_PROMPT, instructions).await
}

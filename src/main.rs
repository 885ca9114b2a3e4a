//! kopilot - Kubernetes 运维助手 CLI
//!
//! 子命令：analyze / audit / diagnose / execute / generate。
//! diagnose 与 execute 走 ReAct 引擎，其余为单轮工作流。

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kopilot::config::{load_config, AppConfig};
use kopilot::llm::{LlmClient, OpenAiClient};
use kopilot::react::{ReactFlow, FALLBACK_RESPONSE};
use kopilot::tools::{
    default_registry, register_mcp_tools, StdioMcpProvider, ToolDispatcher, ToolRegistry,
};
use kopilot::workflows::{analysis_flow, audit_flow, generator_flow};
use kopilot::{kubernetes, tools};

/// Kubernetes Copilot powered by AI
#[derive(Parser)]
#[command(name = "kopilot", version, about)]
struct Args {
    /// AI model to use
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Max tokens for the AI model
    #[arg(short = 't', long, global = true)]
    max_tokens: Option<u32>,

    /// Print tokens count
    #[arg(short, long, global = true)]
    count_tokens: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Max iterations for the agent running
    #[arg(short = 'x', long, global = true)]
    max_iterations: Option<usize>,

    /// MCP config file (JSON, mcpServers map)
    #[arg(long, global = true)]
    mcp_config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze issues for a given resource
    Analyze {
        /// Resource type
        #[arg(short, long, default_value = "pod")]
        resource: String,
        /// Resource name
        #[arg(long)]
        name: String,
        /// Resource namespace
        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
    /// Audit security issues for a Pod
    Audit {
        /// Pod name
        #[arg(long)]
        name: String,
        /// Pod namespace
        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
    /// Diagnose problems for a Pod
    Diagnose {
        /// Pod name
        #[arg(long)]
        name: String,
        /// Pod namespace
        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
    /// Execute operations based on prompt instructions
    Execute {
        /// Instructions to execute
        #[arg(short, long)]
        instructions: String,
    },
    /// Generate Kubernetes manifests
    Generate {
        /// Prompts to generate Kubernetes manifests
        #[arg(short, long)]
        prompt: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 日志：默认 info（--verbose 时 debug），可通过 RUST_LOG 覆盖
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive(default_level.parse().expect("directive")),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        AppConfig::default()
    });

    let model = args.model.clone().unwrap_or_else(|| cfg.llm.model.clone());
    let max_tokens = args.max_tokens.unwrap_or(cfg.llm.max_tokens);
    let llm: Arc<dyn LlmClient> =
        Arc::new(OpenAiClient::from_env().map_err(anyhow::Error::msg)?);

    match &args.command {
        Commands::Analyze {
            resource,
            name,
            namespace,
        } => {
            println!("Analysing {} {}/{}", resource, namespace, name);
            let manifests = kubernetes::get_yaml(resource, name, namespace).await?;
            let manifests = kopilot::llm::tokens::fit_prompt(&manifests, &model);
            if args.verbose {
                println!("Got manifests for {}/{}:\n{}\n", namespace, name, manifests);
            }
            let result = analysis_flow(llm.clone(), &model, max_tokens, manifests).await?;
            println!("{}", result);
        }
        Commands::Audit { name, namespace } => {
            println!("Auditing Pod {}/{}", namespace, name);
            let pod_yaml = kubernetes::get_yaml("pod", name, namespace).await?;
            let pod_yaml = kopilot::llm::tokens::fit_prompt(&pod_yaml, &model);
            let result =
                audit_flow(llm.clone(), &model, max_tokens, namespace, name, pod_yaml).await?;
            println!("{}", result);
        }
        Commands::Diagnose { name, namespace } => {
            println!("Diagnosing Pod {}/{}", namespace, name);
            let instructions = format!(
                "As you diagnose issues for Pod {} in namespace {}, remember to avoid using any delete or edit commands.",
                name, namespace
            );
            run_react(&args, &cfg, llm.clone(), &model, max_tokens, instructions).await?;
        }
        Commands::Execute { instructions } => {
            run_react(
                &args,
                &cfg,
                llm.clone(),
                &model,
                max_tokens,
                instructions.clone(),
            )
            .await?;
        }
        Commands::Generate { prompt } => {
            let instructions = format!("Task: Generate a Kubernetes manifest for {}", prompt);
            let yaml = generator_flow(llm.clone(), &model, max_tokens, instructions).await?;
            println!("{}\n", yaml);

            print!("Do you approve to apply the generated manifests to cluster? (y/n) ");
            std::io::stdout().flush().ok();
            let mut approve = String::new();
            std::io::stdin().read_line(&mut approve).ok();
            let approve = approve.trim().to_lowercase();
            if approve == "y" || approve == "yes" {
                let result = kubernetes::apply_yaml(&yaml).await?;
                println!("{}", result);
            }
        }
    }

    if args.count_tokens {
        let (_, _, total) = llm.token_usage();
        println!("Total tokens: {}", total);
    }

    Ok(())
}

/// 组装工具注册表（内建 + MCP）并跑 ReAct 流
async fn run_react(
    args: &Args,
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    model: &str,
    max_tokens: u32,
    instructions: String,
) -> anyhow::Result<()> {
    let mut registry = default_registry(cfg.tools.disable_kubectl);
    load_mcp_servers(args, cfg, &mut registry).await?;

    let dispatcher = ToolDispatcher::new(Arc::new(registry), model);
    let mut flow = ReactFlow::new(llm, dispatcher, model, instructions)
        .with_max_tokens(max_tokens)
        .with_max_iterations(args.max_iterations.unwrap_or(cfg.react.max_iterations))
        .with_execution_timeout(Duration::from_secs(cfg.react.execution_timeout_secs))
        .with_verbose(args.verbose);

    match flow.run().await {
        Ok(answer) => {
            println!("{}", answer);
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "react flow failed");
            println!("{}", FALLBACK_RESPONSE);
            Err(e.into())
        }
    }
}

/// 按配置连接 MCP 服务器并注册其工具（目前仅 stdio 传输）
async fn load_mcp_servers(
    args: &Args,
    cfg: &AppConfig,
    registry: &mut ToolRegistry,
) -> anyhow::Result<()> {
    let config_path = args.mcp_config.clone().or_else(|| cfg.tools.mcp_config.clone());
    let Some(path) = config_path else {
        return Ok(());
    };

    let mcp_config = tools::load_mcp_config(&path)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("loading MCP config {}", path.display()))?;

    for (name, server) in &mcp_config.mcp_servers {
        if server.command.is_empty() {
            tracing::warn!(server = %name, "only stdio MCP transport is supported, skipping");
            continue;
        }
        let provider = StdioMcpProvider::connect(server)
            .await
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("connecting MCP server {}", name))?;
        register_mcp_tools(registry, name, Arc::new(provider))
            .await
            .map_err(anyhow::Error::msg)?;
    }

    Ok(())
}

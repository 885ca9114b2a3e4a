//! ReAct 主循环：Plan 阶段 + Execute 阶段
//!
//! Plan: 一次 LLM 调用产出结构化计划，解析失败时降级为文本抽取。
//! Execute: 逐步推进计划；每步先 think（模型给出动作），需要时派发工具，
//! 再用 next-step 提示词让模型消化观察并修订计划。
//! 三层嵌套超时：整次运行 60 分钟、执行阶段 execution_timeout（默认 30 分钟）、
//! 单次模型调用与单次工具调用 5 分钟。游标最近三次落点构成滑动窗口，
//! 出现 A-B-A 震荡时强制完成当前步骤打破循环。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::llm::{tokens, LlmClient, Message};
use crate::react::envelope::{
    extract_answer_from_text, parse_envelope, ReactEnvelope, StepAction, StepStatus,
};
use crate::react::history::ChatHistory;
use crate::react::prompts;
use crate::react::tracker::PlanTracker;
use crate::tools::{ToolDispatcher, ToolObservation};

/// 规划失败时给用户的兜底回复
pub const FALLBACK_RESPONSE: &str =
    "I was unable to complete the task due to technical issues. Please try again or simplify your request.";

/// 整次运行的墙钟上限
const RUN_TIMEOUT: Duration = Duration::from_secs(60 * 60);
/// 单次模型调用上限
const MODEL_CALL_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// 执行循环迭代上限（可配置覆盖）
pub const DEFAULT_MAX_ITERATIONS: usize = 30;

/// ReAct 工作流
pub struct ReactFlow {
    model: String,
    instructions: String,
    max_iterations: usize,
    max_tokens: u32,
    run_timeout: Duration,
    /// 向 stdout 打印逐步进度（规划结果、当前步骤、工具调用与观察）
    verbose: bool,
    pub tracker: PlanTracker,
    llm: Arc<dyn LlmClient>,
    dispatcher: ToolDispatcher,
    history: ChatHistory,
    cancel: CancellationToken,
}

impl ReactFlow {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        dispatcher: ToolDispatcher,
        model: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            instructions: instructions.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_tokens: 2048,
            run_timeout: RUN_TIMEOUT,
            verbose: false,
            tracker: PlanTracker::new(),
            llm,
            dispatcher,
            history: ChatHistory::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.tracker.execution_timeout = timeout;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// 执行完整的 ReAct 工作流
    ///
    /// 规划失败与整体超时是致命错误；调用方可用 FALLBACK_RESPONSE 作兜底输出。
    pub async fn run(&mut self) -> Result<String, AgentError> {
        let run_timeout = self.run_timeout;
        match tokio::time::timeout(run_timeout, self.run_inner()).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::RunTimeout),
        }
    }

    async fn run_inner(&mut self) -> Result<String, AgentError> {
        if let Err(e) = self.plan().await {
            self.tracker.last_error = Some(format!("Planning phase failed: {}", e));
            return Err(e);
        }
        self.execute_plan().await
    }

    /// Plan 阶段：一次模型调用产出初始计划
    async fn plan(&mut self) -> Result<(), AgentError> {
        tracing::info!("planning phase: creating a detailed plan");
        if self.verbose {
            println!("Planning phase: creating a detailed plan");
        }

        let menu = self.dispatcher.registry().tool_prompt();
        let system = prompts::plan_prompt(&menu);
        let user = format!(
            "First, create a clear and actionable step-by-step plan to solve this problem: {}",
            self.instructions
        );

        let result = self
            .call_model(&system, user)
            .await
            .map_err(|e| AgentError::PlanningFailed(e.to_string()))?;

        match parse_envelope(&result) {
            Ok(envelope) => self.tracker.ingest(&envelope)?,
            Err(reason) => {
                tracing::warn!(reason = %reason, "plan response is not a valid envelope, extracting steps from text");
                self.tracker.fallback_ingest(&result)?;
            }
        }

        if !self.tracker.has_valid_plan || self.tracker.steps.is_empty() {
            return Err(AgentError::PlanningFailed(
                "no valid plan could be created".to_string(),
            ));
        }

        tracing::info!(steps = self.tracker.steps.len(), "extracted plan");
        tracing::debug!(status = %self.tracker.render_status(), "plan status");
        if self.verbose {
            println!("Extracted plan with {} steps", self.tracker.steps.len());
            println!("Plan status:\n{}", self.tracker.render_status());
        }
        Ok(())
    }

    /// Execute 阶段：主循环
    async fn execute_plan(&mut self) -> Result<String, AgentError> {
        if self.tracker.steps.is_empty() || !self.tracker.has_valid_plan {
            return Err(AgentError::ExecutionFailed(
                "no valid plan to execute".to_string(),
            ));
        }

        let deadline = Instant::now() + self.tracker.execution_timeout;
        let mut window: Vec<usize> = Vec::with_capacity(3);
        let mut iteration = 0usize;

        if self.tracker.current_step >= self.tracker.steps.len() {
            self.tracker.activate(0);
        }

        loop {
            if iteration >= self.max_iterations {
                tracing::warn!(max_iterations = self.max_iterations, "reached maximum number of iterations");
                break;
            }

            if self.cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            if Instant::now() >= deadline {
                return Err(AgentError::ExecutionTimeout(
                    self.tracker.execution_timeout.as_secs(),
                ));
            }

            // 滑动窗口记录最近三次游标落点，A-B-A 视为震荡
            window.push(self.tracker.current_step);
            if window.len() > 3 {
                window.remove(0);
            }
            let mut oscillation = false;
            if window.len() == 3 && window[0] == window[2] && window[0] != window[1] {
                oscillation = true;
                tracing::warn!(
                    step_a = window[0] + 1,
                    step_b = window[1] + 1,
                    "oscillation detected, forcing forward progress"
                );
                if self.verbose {
                    println!(
                        "Oscillation detected between steps {} and {}. Forcing forward progress.",
                        window[0] + 1,
                        window[1] + 1
                    );
                }
                self.tracker.update(
                    self.tracker.current_step,
                    StepStatus::Completed,
                    "",
                    "Automatic completion to break oscillation",
                );
            }

            // 完成检查；顺带把带动作的更早未终态步骤拉回来执行
            let mut is_complete = true;
            for i in 0..self.tracker.steps.len() {
                if self.tracker.steps[i].status.is_terminal() {
                    continue;
                }
                is_complete = false;
                if i < self.tracker.current_step && !oscillation && self.tracker.steps[i].has_action() {
                    tracing::debug!(step = i + 1, "moving back to earlier actionable step");
                    self.tracker.activate(i);
                    break;
                }
            }
            if is_complete {
                tracing::info!("plan execution complete");
                break;
            }

            // 游标越界时重置到第一个未终态步骤
            if self.tracker.current_step >= self.tracker.steps.len() {
                let first_open = self
                    .tracker
                    .steps
                    .iter()
                    .position(|s| !s.status.is_terminal());
                self.tracker.current_step =
                    first_open.unwrap_or(self.tracker.steps.len() - 1);
            }

            if self.tracker.steps[self.tracker.current_step].status == StepStatus::Pending {
                let current = self.tracker.current_step;
                self.tracker.activate(current);
            }

            if let Err(e) = self.execute_step().await {
                self.tracker.last_error = Some(e.to_string());
                let idx = self.tracker.current_step;
                self.tracker.update(idx, StepStatus::Failed, "", &e.to_string());
                if !self.tracker.advance() {
                    if self.tracker.final_answer().is_some() {
                        break;
                    }
                    return Err(AgentError::ExecutionFailed(e.to_string()));
                }
            }

            // 已走到最后一步且终态则收工
            if self.tracker.current_step >= self.tracker.steps.len() - 1 {
                let last = &self.tracker.steps[self.tracker.steps.len() - 1];
                if last.status.is_terminal() {
                    break;
                }
            }

            iteration += 1;
        }

        if self.verbose {
            match self.tracker.final_answer() {
                Some(answer) => println!("Final answer: {}", answer),
                None => println!("No final answer provided, but plan execution is complete."),
            }
        }
        Ok(self.tracker.final_summary())
    }

    /// 执行单个步骤：think 模型调用，随后按需派发工具
    async fn execute_step(&mut self) -> Result<(), AgentError> {
        if self.tracker.steps.is_empty() {
            return Err(AgentError::ExecutionFailed(
                "no steps in execution plan".to_string(),
            ));
        }
        let idx = self.tracker.current_step;
        if idx >= self.tracker.steps.len() {
            return Err(AgentError::ExecutionFailed(format!(
                "current step index {} is out of bounds",
                idx
            )));
        }

        self.tracker.update(idx, StepStatus::InProgress, "", "");
        tracing::debug!(
            step = idx + 1,
            name = %self.tracker.steps[idx].name,
            "executing step"
        );
        if self.verbose {
            println!(
                "[Step {}: {}] {} [{}]",
                idx + 1,
                self.tracker.steps[idx].name,
                self.tracker.steps[idx].description,
                self.tracker.steps[idx].status.as_str()
            );
        }

        let step_result = match self.think_about_step().await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(step = idx + 1, error = %e, "thinking about step failed");
                self.tracker
                    .update(idx, StepStatus::Failed, "", &format!("Error: {}", e));
                if !self.tracker.advance() {
                    self.tracker.last_error = Some(format!("Step thinking failed: {}", e));
                    return Err(e);
                }
                return Ok(());
            }
        };

        let envelope = match parse_envelope(&step_result) {
            Ok(envelope) => envelope,
            Err(reason) => {
                tracing::warn!(reason = %reason, "step response is not a valid envelope");
                let potential = extract_answer_from_text(&step_result);
                if !potential.is_empty() {
                    self.tracker.set_final_answer(&potential);
                }
                self.tracker.update(
                    idx,
                    StepStatus::Failed,
                    "",
                    &format!("Error parsing response: {}", reason),
                );
                if !self.tracker.advance() {
                    if self.tracker.final_answer().is_some() {
                        return Ok(());
                    }
                    return Err(AgentError::JsonParseError(format!(
                        "couldn't parse the response for step {}",
                        idx + 1
                    )));
                }
                return Ok(());
            }
        };

        let original = self.tracker.current_step;
        self.tracker.sync(&envelope);
        if self.tracker.current_step >= self.tracker.steps.len() {
            self.tracker.current_step = original;
        }

        if !envelope.final_answer.is_empty() {
            self.tracker.set_final_answer(&envelope.final_answer);
            let idx = self.tracker.current_step;
            self.tracker
                .update(idx, StepStatus::Completed, "", "Final answer provided");
            if idx + 1 >= self.tracker.steps.len() {
                return Ok(());
            }
            self.tracker.advance();
            return Ok(());
        }

        self.execute_tool_if_needed(&envelope).await
    }

    /// think 提示词：用户指令 + 当前计划（JSON 渲染）+ 当前下标
    async fn think_about_step(&mut self) -> Result<String, AgentError> {
        let current_envelope = self
            .tracker
            .as_envelope(&self.instructions, "Executing the next step in the plan");
        let plan_json =
            serde_json::to_string_pretty(&current_envelope).unwrap_or_else(|_| "{}".to_string());

        let menu = self.dispatcher.registry().tool_prompt();
        let system = prompts::react_prompt(&menu);
        let user = format!(
            "User input: {}\n\nCurrent plan and status:\n{}\n\nExecute the current step (index {}) of the plan.",
            self.instructions, plan_json, self.tracker.current_step
        );

        self.call_model(&system, user).await
    }

    /// 当前步骤带动作则派发工具并做观察后处理，否则直接完成
    async fn execute_tool_if_needed(&mut self, envelope: &ReactEnvelope) -> Result<(), AgentError> {
        let idx = self.tracker.current_step;
        if idx >= self.tracker.steps.len() {
            return Err(AgentError::ExecutionFailed(format!(
                "invalid current step index: {}",
                idx
            )));
        }

        let mut action = self.tracker.steps[idx].action.clone();
        if action.is_empty() {
            if let Some(step) = envelope.steps.get(idx) {
                if step.has_action() {
                    action = step.action.clone();
                    self.tracker.steps[idx].action = action.clone();
                }
            }
        }

        if action.is_empty() {
            self.tracker.update(
                idx,
                StepStatus::Completed,
                "",
                "Step completed without tool execution",
            );
            self.tracker.advance();
            return Ok(());
        }

        tracing::info!(tool = %action.name, "executing tool");
        if self.verbose {
            println!(
                "Invoking {} tool with inputs:\n============\n{}\n============\n",
                action.name, action.input
            );
        }
        let observation = self
            .dispatcher
            .invoke(&action.name, &action.input, self.tracker.execution_timeout)
            .await;
        if self.verbose {
            println!("Tool {} result:\n{}\n", action.name, observation.text);
        }

        // 观察先记录；failed 终态的落定推迟到观察后处理决定是否重试之后
        self.tracker
            .update(idx, StepStatus::InProgress, &action.name, &observation.text);

        self.process_tool_observation(&action, observation).await
    }

    /// 工具观察后处理：第二次模型调用修订计划
    async fn process_tool_observation(
        &mut self,
        action: &StepAction,
        observation: ToolObservation,
    ) -> Result<(), AgentError> {
        let idx = self.tracker.current_step;
        let outcome_status = if observation.failed {
            StepStatus::Failed
        } else {
            StepStatus::Completed
        };

        let mut observed_step = self.tracker.steps[idx].clone();
        observed_step.observation = observation.text.clone();
        let step_json =
            serde_json::to_string_pretty(&observed_step).unwrap_or_else(|_| "{}".to_string());

        let system = prompts::next_step_prompt();
        let user = format!(
            "User input: {}\n\nCurrent plan with tool execution result:\n{}\n",
            self.instructions, step_json
        );

        let result = match self.call_model(&system, user).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "processing tool observation failed");
                self.tracker
                    .update(idx, StepStatus::Failed, &action.name, &observation.text);
                self.tracker.advance();
                return Ok(());
            }
        };

        let next = match parse_envelope(&result) {
            Ok(envelope) => envelope,
            Err(reason) => {
                tracing::warn!(reason = %reason, "observation response is not a valid envelope");
                let potential = extract_answer_from_text(&result);
                if !potential.is_empty() {
                    self.tracker.set_final_answer(&potential);
                }
                self.tracker
                    .update(idx, outcome_status, &action.name, &observation.text);
                self.tracker.advance();
                return Ok(());
            }
        };

        // 模型对观察的思考写回步骤观察字段
        let thought = next.thought.clone();
        if !thought.is_empty() {
            self.tracker.steps[idx].observation = thought.clone();
        }

        self.tracker.sync(&next);

        if !next.final_answer.is_empty() {
            self.tracker.set_final_answer(&next.final_answer);
            let current = self.tracker.current_step;
            self.tracker
                .update(current, StepStatus::Completed, &action.name, &thought);
            self.tracker.advance();
            return Ok(());
        }

        let original = self.tracker.current_step;
        let mut target = next.current_step_index;
        if target < 0 || target as usize >= next.steps.len() {
            target = original as i64;
        }
        let target = target as usize;

        // 同一步骤 + 新动作：保持活跃并重试
        if target == original {
            if let Some(step) = next.steps.get(target) {
                if step.has_action() && !self.tracker.steps[original].status.is_terminal() {
                    tracing::debug!(step = original + 1, tool = %step.action.name, "retrying step with new action");
                    if !thought.is_empty() {
                        self.tracker.steps[original].observation = thought.clone();
                    }
                    self.tracker.steps[original].action = step.action.clone();
                    self.tracker.steps[original].status = StepStatus::InProgress;
                    return Ok(());
                }
            }
        }

        // 模型指向更靠后且带动作的步骤：完成当前并跳过去
        if target > original && next.steps[target].has_action() && target < self.tracker.steps.len()
        {
            self.tracker
                .update(original, outcome_status, &action.name, &thought);
            self.tracker.steps[target].action = next.steps[target].action.clone();
            if !self.tracker.steps[target].status.is_terminal() {
                self.tracker.steps[target].status = StepStatus::Pending;
            }
            self.tracker.current_step = target;
            tracing::debug!(step = target + 1, "jumping forward to actionable step");
            return Ok(());
        }

        // 扫描信封中任一带动作且在本方仍开放的步骤
        for i in 0..next.steps.len() {
            if i == original {
                continue;
            }
            if next.steps[i].has_action()
                && i < self.tracker.steps.len()
                && matches!(
                    self.tracker.steps[i].status,
                    StepStatus::Pending | StepStatus::InProgress
                )
            {
                self.tracker
                    .update(original, outcome_status, &action.name, &thought);
                self.tracker.steps[i].action = next.steps[i].action.clone();
                self.tracker.current_step = i;
                tracing::debug!(step = i + 1, "moving to actionable step");
                return Ok(());
            }
        }

        // 默认：按工具结果落定当前步骤并推进
        self.tracker
            .update(original, outcome_status, &action.name, &thought);
        self.tracker.advance();
        Ok(())
    }

    /// 一次模型调用：system + 有界历史 + user，整体裁剪到 token 预算内，
    /// 5 分钟超时；成功后把 user/assistant 追加进历史
    async fn call_model(&mut self, system: &str, user: String) -> Result<String, AgentError> {
        let mut messages = vec![Message::system(system)];
        messages.extend_from_slice(self.history.messages());
        messages.push(Message::user(user.clone()));
        let messages = tokens::fit_messages(messages, &self.model);

        let reply = tokio::time::timeout(
            MODEL_CALL_TIMEOUT,
            self.llm.chat(&self.model, self.max_tokens, &messages),
        )
        .await
        .map_err(|_| {
            AgentError::LlmError(format!(
                "model call timed out after {} seconds",
                MODEL_CALL_TIMEOUT.as_secs()
            ))
        })?
        .map_err(AgentError::LlmError)?;

        self.history.push(Message::user(user));
        self.history.push(Message::assistant(reply.clone()));
        Ok(reply)
    }

    /// 本次运行累计的 LLM token 使用
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }
}

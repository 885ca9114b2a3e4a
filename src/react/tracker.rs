//! 计划跟踪器：步骤、状态与游标的权威状态
//!
//! 模型信封只是提案，所有状态变更都经过这里。状态机保持单调：
//! completed / failed 为终态，此后只允许回填空白的外围字段；
//! 任意时刻至多一个步骤处于 in_progress，且必然位于游标处。

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use regex::Regex;

use crate::error::AgentError;
use crate::react::envelope::{ReactEnvelope, StepDetail, StepStatus};

/// 执行阶段默认上限
const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// 降级解析时句子片段的最小长度
const MIN_SENTENCE_LEN: usize = 10;

pub struct PlanTracker {
    pub plan_id: String,
    pub steps: Vec<StepDetail>,
    pub current_step: usize,
    pub last_error: Option<String>,
    final_answer: Option<String>,
    pub has_valid_plan: bool,
    pub execution_timeout: Duration,
}

impl Default for PlanTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanTracker {
    pub fn new() -> Self {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            plan_id: format!("plan_{}", ts),
            steps: Vec::new(),
            current_step: 0,
            last_error: None,
            final_answer: None,
            has_valid_plan: false,
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }

    /// 记录最终答案；空白文本不会覆盖已有答案
    pub fn set_final_answer(&mut self, answer: &str) {
        if !answer.trim().is_empty() {
            self.final_answer = Some(answer.to_string());
        }
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    pub fn current(&self) -> Option<&StepDetail> {
        self.steps.get(self.current_step)
    }

    /// 从模型信封构建初始计划
    ///
    /// steps 为空时降级解析 thought；游标取信封下标（越界回落到 0），
    /// 被选中的 pending 步骤提升为 in_progress。
    pub fn ingest(&mut self, envelope: &ReactEnvelope) -> Result<(), AgentError> {
        if envelope.steps.is_empty() {
            if !envelope.thought.is_empty() {
                return self.fallback_ingest(&envelope.thought);
            }
            return Err(AgentError::PlanningFailed(
                "no steps found in model envelope".to_string(),
            ));
        }

        self.steps = envelope.steps.clone();
        self.has_valid_plan = true;

        let idx = envelope.current_step_index;
        self.current_step = if idx >= 0 && (idx as usize) < self.steps.len() {
            idx as usize
        } else {
            0
        };
        if self.steps[self.current_step].status == StepStatus::Pending {
            self.steps[self.current_step].status = StepStatus::InProgress;
        }
        self.normalize_active();

        self.set_final_answer(&envelope.final_answer);
        Ok(())
    }

    /// 信封不可解析时，从自由文本中尽力抽取步骤
    ///
    /// 先按行匹配编号/项目符号，再退到句子切分（保留长度 >= 10 的片段）。
    pub fn fallback_ingest(&mut self, plan_text: &str) -> Result<(), AgentError> {
        if plan_text.trim().is_empty() {
            return Err(AgentError::PlanningFailed("empty plan string".to_string()));
        }

        let step_pattern =
            Regex::new(r"^(\d+\.|\*|Step \d+:|[-•])\s*(.+)$").expect("step line pattern");

        let mut steps: Vec<StepDetail> = Vec::new();
        for (i, line) in plan_text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(captures) = step_pattern.captures(line) {
                steps.push(StepDetail {
                    name: format!("Step {}", i + 1),
                    description: captures[2].trim().to_string(),
                    status: StepStatus::Pending,
                    ..Default::default()
                });
            }
        }

        if steps.is_empty() {
            let sentence_pattern = Regex::new(r"[.!?]+\s+|\n+").expect("sentence pattern");
            for (i, sentence) in sentence_pattern.split(plan_text).enumerate() {
                let sentence = sentence.trim();
                if sentence.len() >= MIN_SENTENCE_LEN {
                    steps.push(StepDetail {
                        name: format!("Step {}", i + 1),
                        description: sentence.to_string(),
                        status: StepStatus::Pending,
                        ..Default::default()
                    });
                }
            }
        }

        if steps.is_empty() {
            return Err(AgentError::PlanningFailed(
                "no steps could be extracted from plan".to_string(),
            ));
        }

        self.steps = steps;
        self.current_step = 0;
        self.has_valid_plan = true;
        Ok(())
    }

    /// 将后续信封与当前状态对账
    ///
    /// 终态步骤只回填空白的 name/description/action；其余步骤整体同步，
    /// 但 pending -> completed 的非法跃迁被压回 in_progress。信封中多出的
    /// 步骤会被追加（信封是再规划通道）。游标服从向前推进规则：向前总是
    /// 允许；向后仅当当前步骤已终态、目标步骤未终态且带有动作。
    pub fn sync(&mut self, envelope: &ReactEnvelope) {
        if envelope.steps.is_empty() {
            return;
        }

        for i in self.steps.len()..envelope.steps.len() {
            self.steps.push(envelope.steps[i].clone());
        }

        let was_terminal: Vec<bool> = self.steps.iter().map(|s| s.status.is_terminal()).collect();

        for (i, incoming) in envelope.steps.iter().enumerate() {
            if i >= self.steps.len() {
                break;
            }
            let step = &mut self.steps[i];

            if was_terminal[i] {
                // 终态步骤：只补充缺失的信息，不动状态
                if step.action.is_empty() && incoming.has_action() {
                    step.action = incoming.action.clone();
                }
                if step.description.is_empty() && !incoming.description.is_empty() {
                    step.description = incoming.description.clone();
                }
                if step.name.is_empty() && !incoming.name.is_empty() {
                    step.name = incoming.name.clone();
                }
                continue;
            }

            let original_status = step.status;
            step.name = incoming.name.clone();
            step.description = incoming.description.clone();
            if incoming.has_action() {
                step.action = incoming.action.clone();
            }

            if original_status == StepStatus::Pending && incoming.status == StepStatus::Completed {
                // 不允许跳过 in_progress 直接完成
                step.status = StepStatus::InProgress;
            } else {
                step.status = incoming.status;
            }

            if !incoming.observation.is_empty() {
                step.observation = incoming.observation.clone();
            }
        }

        let idx = envelope.current_step_index;
        if idx >= 0 && (idx as usize) < self.steps.len() {
            let idx = idx as usize;
            let should_move = if idx > self.current_step {
                true
            } else if idx < self.current_step {
                self.steps[self.current_step].status.is_terminal()
                    && !self.steps[idx].status.is_terminal()
                    && self.steps[idx].has_action()
            } else {
                false
            };

            if should_move {
                self.current_step = idx;
                if self.steps[idx].status == StepStatus::Pending {
                    self.steps[idx].status = StepStatus::InProgress;
                }
            }
        }

        self.normalize_active();
    }

    /// 直接更新步骤状态；终态不变（只回填动作名与观察文本）
    pub fn update(&mut self, index: usize, status: StepStatus, tool_name: &str, observation: &str) {
        let Some(step) = self.steps.get_mut(index) else {
            return;
        };
        if !step.status.is_terminal() {
            step.status = status;
        }
        if !tool_name.is_empty() {
            step.action.name = tool_name.to_string();
        }
        if !observation.is_empty() {
            step.observation = observation.to_string();
        }
    }

    /// 选出下一个游标位置
    ///
    /// 离开的步骤除非已 failed 否则记为 completed；优先向前找 pending，
    /// 其次从头回扫（游标已在最后一步时同样回扫，避免饿死更早的步骤），
    /// 再其次找其它 in_progress，最后机械 +1；
    /// 没有可走的步骤时停在最后一步并返回 false。
    pub fn advance(&mut self) -> bool {
        if self.steps.is_empty() {
            return false;
        }

        let original = self.current_step.min(self.steps.len() - 1);
        self.current_step = original;
        if self.steps[original].status != StepStatus::Failed {
            self.steps[original].status = StepStatus::Completed;
        }

        for i in original + 1..self.steps.len() {
            if self.steps[i].status == StepStatus::Pending {
                self.current_step = i;
                self.steps[i].status = StepStatus::InProgress;
                return true;
            }
        }

        for i in 0..original {
            if self.steps[i].status == StepStatus::Pending {
                self.current_step = i;
                self.steps[i].status = StepStatus::InProgress;
                return true;
            }
        }

        for i in 0..self.steps.len() {
            if i != original && self.steps[i].status == StepStatus::InProgress {
                self.current_step = i;
                return true;
            }
        }

        // 没有任何待执行步骤，机械推进一格；已在最后一步则报告穷尽
        if original + 1 < self.steps.len() {
            self.current_step = original + 1;
            if !self.steps[self.current_step].status.is_terminal() {
                self.steps[self.current_step].status = StepStatus::InProgress;
            }
            return true;
        }
        false
    }

    /// 把游标移到指定步骤并激活它（非终态时置为 in_progress）
    pub fn activate(&mut self, index: usize) {
        if index >= self.steps.len() {
            return;
        }
        self.current_step = index;
        if !self.steps[index].status.is_terminal() {
            self.steps[index].status = StepStatus::InProgress;
        }
        self.normalize_active();
    }

    /// 所有步骤均为 completed / failed 且计划非空
    pub fn is_complete(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.status.is_terminal())
    }

    /// 保证 in_progress 唯一且位于游标处
    fn normalize_active(&mut self) {
        let current = self.current_step;
        for (i, step) in self.steps.iter_mut().enumerate() {
            if i != current && step.status == StepStatus::InProgress {
                step.status = StepStatus::Pending;
            }
        }
    }

    /// 以当前计划构造一个信封（供 think 提示词渲染）
    pub fn as_envelope(&self, question: &str, thought: &str) -> ReactEnvelope {
        ReactEnvelope {
            question: question.to_string(),
            thought: thought.to_string(),
            steps: self.steps.clone(),
            current_step_index: self.current_step as i64,
            final_answer: String::new(),
        }
    }

    /// 人类可读的计划状态视图
    pub fn render_status(&self) -> String {
        let mut out = format!("Plan ID: {}\n\n", self.plan_id);

        for (i, step) in self.steps.iter().enumerate() {
            let symbol = match step.status {
                StepStatus::Pending => "⏳",
                StepStatus::InProgress => "🔄",
                StepStatus::Completed => "✅",
                StepStatus::Failed => "❌",
            };
            out.push_str(&format!(
                "{} Step {}: {} [{}]\n",
                symbol,
                i + 1,
                step.description,
                step.status.as_str()
            ));
            if !step.observation.is_empty() {
                out.push_str(&format!(
                    "   Observation:\n{}\n",
                    indent_observation(&step.observation)
                ));
            }
        }

        out
    }

    /// 最终输出：已有答案直接返回，否则汇总每步描述与观察（观察截断到 200 字符）
    pub fn final_summary(&self) -> String {
        if let Some(answer) = &self.final_answer {
            return answer.clone();
        }

        let mut out =
            String::from("I've completed all the steps in the plan. Here's a summary of what I did:\n\n");
        for (i, step) in self.steps.iter().enumerate() {
            out.push_str(&format!(
                "Step {}: {} [status: {}]\n",
                i + 1,
                step.description,
                step.status.as_str()
            ));
            let observation = if step.observation.chars().count() > 200 {
                let head: String = step.observation.chars().take(200).collect();
                format!("{} <truncated>", head)
            } else {
                step.observation.clone()
            };
            out.push_str(&format!(
                "Observation:\n{}\n\n",
                indent_observation(&observation)
            ));
        }

        out
    }
}

fn indent_observation(observation: &str) -> String {
    if observation.is_empty() {
        return String::new();
    }
    observation
        .lines()
        .map(|line| format!("   {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

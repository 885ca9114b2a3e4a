//! ReAct 工作流端到端测试：脚本化 Mock LLM + 内存工具

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kopilot::error::AgentError;
use kopilot::llm::{MockLlmClient, ScriptedReply};
use kopilot::react::{ReactFlow, StepStatus};
use kopilot::tools::{Tool, ToolDispatcher, ToolFailure, ToolRegistry};

/// 脚本化工具：按调用顺序弹出预置结果，并记录每次输入
struct ScriptedTool {
    name: &'static str,
    replies: Mutex<Vec<Result<String, ToolFailure>>>,
    invocations: Arc<Mutex<Vec<String>>>,
    delay: Duration,
}

impl ScriptedTool {
    fn new(name: &'static str, replies: Vec<Result<String, ToolFailure>>) -> Self {
        Self {
            name,
            replies: Mutex::new(replies),
            invocations: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn invocation_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.invocations.clone()
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "scripted test tool"
    }
    fn input_schema(&self) -> &str {
        "any text"
    }
    async fn invoke(&self, input: &str) -> Result<String, ToolFailure> {
        self.invocations.lock().unwrap().push(input.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            Ok("no scripted reply".to_string())
        } else {
            replies.remove(0)
        }
    }
}

fn dispatcher_with(tools: Vec<ScriptedTool>) -> ToolDispatcher {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool);
    }
    ToolDispatcher::new(Arc::new(registry), "gpt-4o")
}

fn flow_with(
    replies: Vec<ScriptedReply>,
    dispatcher: ToolDispatcher,
    instructions: &str,
) -> ReactFlow {
    let llm = Arc::new(MockLlmClient::new(replies));
    ReactFlow::new(llm, dispatcher, "gpt-4o", instructions)
}

/// 校验任一时刻至多一个 in_progress 且位于游标处
fn assert_single_active(flow: &ReactFlow) {
    let active: Vec<usize> = flow
        .tracker
        .steps
        .iter()
        .enumerate()
        .filter(|(_, s)| s.status == StepStatus::InProgress)
        .map(|(i, _)| i)
        .collect();
    assert!(active.len() <= 1, "more than one in_progress step: {:?}", active);
    if let Some(&i) = active.first() {
        assert_eq!(i, flow.tracker.current_step);
    }
}

#[tokio::test]
async fn test_happy_path_without_tool() {
    let answer = "Pods go through Pending→Running→Succeeded/Failed.";
    let plan = format!(
        r#"{{"question":"Explain pod lifecycle.","thought":"two explanatory steps","steps":[
            {{"name":"Step 1","description":"Explain phases","status":"pending"}},
            {{"name":"Step 2","description":"Summarize","status":"pending"}}],
            "current_step_index":0,"final_answer":"{}"}}"#,
        answer
    );
    let think1 = format!(
        r#"{{"question":"Explain pod lifecycle.","thought":"phases explained","steps":[
            {{"name":"Step 1","description":"Explain phases","status":"in_progress"}},
            {{"name":"Step 2","description":"Summarize","status":"pending"}}],
            "current_step_index":0,"final_answer":"{}"}}"#,
        answer
    );
    let think2 = format!(
        r#"{{"question":"Explain pod lifecycle.","thought":"summary done","steps":[
            {{"name":"Step 1","description":"Explain phases","status":"completed"}},
            {{"name":"Step 2","description":"Summarize","status":"in_progress"}}],
            "current_step_index":1,"final_answer":"{}"}}"#,
        answer
    );

    let mut flow = flow_with(
        vec![
            ScriptedReply::ok(plan),
            ScriptedReply::ok(think1),
            ScriptedReply::ok(think2),
        ],
        dispatcher_with(vec![]),
        "Explain pod lifecycle.",
    );

    let result = flow.run().await.unwrap();
    assert_eq!(result, answer);
    assert_eq!(flow.tracker.steps.len(), 2);
    for step in &flow.tracker.steps {
        assert_eq!(step.status, StepStatus::Completed);
    }
    assert_single_active(&flow);
}

#[tokio::test]
async fn test_single_tool_call() {
    let plan = r#"{"question":"List pods in default.","thought":"one kubectl call","steps":[
        {"name":"List pods","description":"List pods in the default namespace",
         "action":{"name":"kubectl","input":"get pods -n default"},"status":"pending"}],
        "current_step_index":0,"final_answer":""}"#;
    let think = r#"{"question":"List pods in default.","thought":"run kubectl","steps":[
        {"name":"List pods","description":"List pods in the default namespace",
         "action":{"name":"kubectl","input":"get pods -n default"},"status":"in_progress"}],
        "current_step_index":0,"final_answer":""}"#;
    let next_step = r#"{"question":"List pods in default.","thought":"Two pods are running.","steps":[
        {"name":"List pods","description":"List pods in the default namespace",
         "action":{"name":"kubectl","input":"get pods -n default"},"status":"completed"}],
        "current_step_index":0,"final_answer":"Two pods are running."}"#;

    let kubectl = ScriptedTool::new(
        "kubectl",
        vec![Ok("pod/a Running\npod/b Running".to_string())],
    );
    let log = kubectl.invocation_log();

    let mut flow = flow_with(
        vec![
            ScriptedReply::ok(plan),
            ScriptedReply::ok(think),
            ScriptedReply::ok(next_step),
        ],
        dispatcher_with(vec![kubectl]),
        "List pods in default.",
    );

    let result = flow.run().await.unwrap();
    assert_eq!(result, "Two pods are running.");
    assert_eq!(flow.tracker.steps[0].status, StepStatus::Completed);
    assert_eq!(log.lock().unwrap().as_slice(), ["get pods -n default"]);
}

#[tokio::test]
async fn test_tool_failure_then_retry_with_new_input() {
    let plan = r#"{"question":"List pods.","thought":"query the pod","steps":[
        {"name":"Query","description":"Query the pod",
         "action":{"name":"kubectl","input":"get pod missing"},"status":"pending"}],
        "current_step_index":0,"final_answer":""}"#;
    let think1 = r#"{"question":"List pods.","thought":"query the pod","steps":[
        {"name":"Query","description":"Query the pod",
         "action":{"name":"kubectl","input":"get pod missing"},"status":"in_progress"}],
        "current_step_index":0,"final_answer":""}"#;
    // 同一下标 + 新输入：重试本步骤
    let retry = r#"{"question":"List pods.","thought":"pod not found, list all pods instead","steps":[
        {"name":"Query","description":"Query the pod",
         "action":{"name":"kubectl","input":"get pods"},"status":"in_progress"}],
        "current_step_index":0,"final_answer":""}"#;
    let think2 = r#"{"question":"List pods.","thought":"run the fixed command","steps":[
        {"name":"Query","description":"Query the pod",
         "action":{"name":"kubectl","input":"get pods"},"status":"in_progress"}],
        "current_step_index":0,"final_answer":""}"#;
    let done = r#"{"question":"List pods.","thought":"Two pods are running.","steps":[
        {"name":"Query","description":"Query the pod",
         "action":{"name":"kubectl","input":"get pods"},"status":"completed"}],
        "current_step_index":0,"final_answer":"Two pods are running."}"#;

    let kubectl = ScriptedTool::new(
        "kubectl",
        vec![
            Err(ToolFailure::new(
                r#"Error from server (NotFound): pods "missing" not found"#,
                "exit status 1",
            )),
            Ok("pod/a Running\npod/b Running".to_string()),
        ],
    );
    let log = kubectl.invocation_log();

    let llm = Arc::new(MockLlmClient::new(vec![
        ScriptedReply::ok(plan),
        ScriptedReply::ok(think1),
        ScriptedReply::ok(retry),
        ScriptedReply::ok(think2),
        ScriptedReply::ok(done),
    ]));
    let mut flow = ReactFlow::new(
        llm.clone(),
        dispatcher_with(vec![kubectl]),
        "gpt-4o",
        "List pods.",
    );

    let result = flow.run().await.unwrap();
    assert_eq!(result, "Two pods are running.");
    // 重试：同一步骤两次工具调用，第二次换了输入
    assert_eq!(
        log.lock().unwrap().as_slice(),
        ["get pod missing", "get pods"]
    );
    // 步骤从未落入 failed，最终 completed
    assert_eq!(flow.tracker.steps[0].status, StepStatus::Completed);
    // 两轮迭代恰好消费完脚本（1 次规划 + 每轮 think/next-step 各一次）
    assert_eq!(llm.remaining(), 0);
}

#[tokio::test]
async fn test_malformed_envelope_extracts_answer() {
    let plan = r#"{"question":"q","thought":"one step","steps":[
        {"name":"Step 1","description":"Answer the question","status":"pending"}],
        "current_step_index":0,"final_answer":""}"#;

    let mut flow = flow_with(
        vec![
            ScriptedReply::ok(plan),
            ScriptedReply::ok("Sorry, I think the answer is 42."),
        ],
        dispatcher_with(vec![]),
        "q",
    );

    let result = flow.run().await.unwrap();
    assert_eq!(result, "42.");
    assert_eq!(flow.tracker.steps[0].status, StepStatus::Failed);
}

#[tokio::test]
async fn test_oscillation_forces_completion() {
    let plan = r#"{"question":"q","thought":"three steps","steps":[
        {"name":"Step 1","description":"Gather context","status":"completed"},
        {"name":"Step 2","description":"Check pods","action":{"name":"tool_a","input":"a"},"status":"pending"},
        {"name":"Step 3","description":"Check events","action":{"name":"tool_b","input":"b"},"status":"pending"}],
        "current_step_index":1,"final_answer":""}"#;
    let think_s2 = r#"{"question":"q","thought":"run tool_a","steps":[
        {"name":"Step 1","description":"Gather context","status":"completed"},
        {"name":"Step 2","description":"Check pods","action":{"name":"tool_a","input":"a"},"status":"in_progress"},
        {"name":"Step 3","description":"Check events","action":{"name":"tool_b","input":"b"},"status":"pending"}],
        "current_step_index":1,"final_answer":""}"#;
    // 观察后模型跳到第 3 步
    let jump_to_s3 = r#"{"question":"q","thought":"look at events next","steps":[
        {"name":"Step 1","description":"Gather context","status":"completed"},
        {"name":"Step 2","description":"Check pods","action":{"name":"tool_a","input":"a"},"status":"in_progress"},
        {"name":"Step 3","description":"Check events","action":{"name":"tool_b","input":"b"},"status":"pending"}],
        "current_step_index":2,"final_answer":""}"#;
    // 再次观察后模型又回到第 2 步（震荡的另一半）
    let back_to_s2 = r#"{"question":"q","thought":"recheck pods","steps":[
        {"name":"Step 1","description":"Gather context","status":"completed"},
        {"name":"Step 2","description":"Check pods","action":{"name":"tool_a","input":"a"},"status":"in_progress"},
        {"name":"Step 3","description":"Check events","action":{"name":"tool_b","input":"b"},"status":"pending"}],
        "current_step_index":1,"final_answer":""}"#;
    let finish = r#"{"question":"q","thought":"wrap up","steps":[
        {"name":"Step 1","description":"Gather context","status":"completed"},
        {"name":"Step 2","description":"Check pods","status":"completed"},
        {"name":"Step 3","description":"Check events","status":"in_progress"}],
        "current_step_index":2,"final_answer":"done"}"#;

    let tool_a = ScriptedTool::new("tool_a", vec![Ok("a ok".to_string()), Ok("a ok".to_string())]);
    let tool_b = ScriptedTool::new("tool_b", vec![Ok("b ok".to_string())]);

    let mut flow = flow_with(
        vec![
            ScriptedReply::ok(plan),       // 规划
            ScriptedReply::ok(think_s2),   // 迭代 0 think（游标 1）
            ScriptedReply::ok(jump_to_s3), // 迭代 0 观察：跳到步骤 3
            ScriptedReply::ok(think_s2),   // 迭代 1 think（移回后游标 1）
            ScriptedReply::ok(back_to_s2), // 迭代 1 观察：留在步骤 2
            ScriptedReply::ok(finish),     // 迭代 2：震荡已被打破
        ],
        dispatcher_with(vec![tool_a, tool_b]),
        "q",
    );

    let result = flow.run().await.unwrap();
    assert_eq!(result, "done");
    // 震荡被强制完成打破，并留下诊断观察
    assert_eq!(flow.tracker.steps[1].status, StepStatus::Completed);
    assert_eq!(
        flow.tracker.steps[1].observation,
        "Automatic completion to break oscillation"
    );
}

#[tokio::test]
async fn test_execution_timeout_marks_step_failed() {
    let plan = r#"{"question":"q","thought":"slow tool","steps":[
        {"name":"Slow","description":"Run the slow tool",
         "action":{"name":"slow","input":"x"},"status":"pending"}],
        "current_step_index":0,"final_answer":""}"#;
    let think = r#"{"question":"q","thought":"run it","steps":[
        {"name":"Slow","description":"Run the slow tool",
         "action":{"name":"slow","input":"x"},"status":"in_progress"}],
        "current_step_index":0,"final_answer":""}"#;
    // 观察后模型无动作也无答案：按工具结果落定
    let shrug = r#"{"question":"q","thought":"","steps":[
        {"name":"Slow","description":"Run the slow tool","status":"in_progress"}],
        "current_step_index":0,"final_answer":""}"#;

    let slow = ScriptedTool::new("slow", vec![Ok("too late".to_string())])
        .with_delay(Duration::from_secs(1));

    let mut flow = flow_with(
        vec![
            ScriptedReply::ok(plan),
            ScriptedReply::ok(think),
            ScriptedReply::ok(shrug),
        ],
        dispatcher_with(vec![slow]),
        "q",
    )
    .with_execution_timeout(Duration::from_millis(100));

    let start = Instant::now();
    let result = flow.run().await.unwrap();
    // 工具输出不会越过截止时间泄露
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(flow.tracker.steps[0].status, StepStatus::Failed);
    assert!(flow.tracker.steps[0].observation.contains("timed out"));
    assert!(!flow.tracker.steps[0].observation.contains("too late"));
    assert!(result.contains("timed out"));
}

#[tokio::test]
async fn test_planning_failure_is_fatal() {
    let mut flow = flow_with(
        vec![ScriptedReply::err("boom")],
        dispatcher_with(vec![]),
        "q",
    );
    let err = flow.run().await.unwrap_err();
    assert!(matches!(err, AgentError::PlanningFailed(_)));
}

#[tokio::test]
async fn test_plan_fallback_from_free_text() {
    // 规划回复不是 JSON，但能按行抽取步骤
    let plan_text = "Here is my plan:\n1. Inspect the pod status\n2. Check recent events";
    let think = r#"{"question":"q","thought":"","steps":[
        {"name":"Step 1","description":"Inspect the pod status","status":"in_progress"},
        {"name":"Step 2","description":"Check recent events","status":"pending"}],
        "current_step_index":0,"final_answer":"inspected"}"#;
    let think2 = r#"{"question":"q","thought":"","steps":[
        {"name":"Step 1","description":"Inspect the pod status","status":"completed"},
        {"name":"Step 2","description":"Check recent events","status":"in_progress"}],
        "current_step_index":1,"final_answer":"inspected"}"#;

    let mut flow = flow_with(
        vec![
            ScriptedReply::ok(plan_text),
            ScriptedReply::ok(think),
            ScriptedReply::ok(think2),
        ],
        dispatcher_with(vec![]),
        "q",
    );

    let result = flow.run().await.unwrap();
    assert_eq!(result, "inspected");
    assert_eq!(flow.tracker.steps.len(), 2);
}

#[tokio::test]
async fn test_iteration_limit_stops_loop() {
    // think 始终给出同一步骤的新动作，观察后又原地重试：没有上限就会永远跑下去
    let plan = r#"{"question":"q","thought":"loop","steps":[
        {"name":"Loop","description":"Keep retrying",
         "action":{"name":"noop","input":"x"},"status":"pending"}],
        "current_step_index":0,"final_answer":""}"#;
    let think = r#"{"question":"q","thought":"try again","steps":[
        {"name":"Loop","description":"Keep retrying",
         "action":{"name":"noop","input":"x"},"status":"in_progress"}],
        "current_step_index":0,"final_answer":""}"#;

    let mut replies = vec![ScriptedReply::ok(plan)];
    for _ in 0..4 {
        replies.push(ScriptedReply::ok(think));
    }

    let noop = ScriptedTool::new("noop", vec![]);
    let mut flow = flow_with(replies, dispatcher_with(vec![noop]), "q").with_max_iterations(2);

    let result = flow.run().await.unwrap();
    // 无最终答案时输出步骤汇总
    assert!(result.contains("Here's a summary"));
    assert!(result.contains("Keep retrying"));
}

#[tokio::test]
async fn test_run_timeout() {
    let mut flow = flow_with(
        vec![ScriptedReply::ok("{}").with_delay(Duration::from_millis(300))],
        dispatcher_with(vec![]),
        "q",
    )
    .with_run_timeout(Duration::from_millis(50));

    let err = flow.run().await.unwrap_err();
    assert!(matches!(err, AgentError::RunTimeout));
}

#[tokio::test]
async fn test_missing_tool_lets_model_switch() {
    let plan = r#"{"question":"q","thought":"use a bogus tool","steps":[
        {"name":"Step 1","description":"Call a tool that does not exist",
         "action":{"name":"nonexistent","input":"x"},"status":"pending"}],
        "current_step_index":0,"final_answer":""}"#;
    let think = r#"{"question":"q","thought":"call it","steps":[
        {"name":"Step 1","description":"Call a tool that does not exist",
         "action":{"name":"nonexistent","input":"x"},"status":"in_progress"}],
        "current_step_index":0,"final_answer":""}"#;
    let give_up = r#"{"question":"q","thought":"","steps":[
        {"name":"Step 1","description":"Call a tool that does not exist","status":"in_progress"}],
        "current_step_index":0,"final_answer":""}"#;

    let mut flow = flow_with(
        vec![
            ScriptedReply::ok(plan),
            ScriptedReply::ok(think),
            ScriptedReply::ok(give_up),
        ],
        dispatcher_with(vec![]),
        "q",
    );

    let result = flow.run().await.unwrap();
    assert_eq!(flow.tracker.steps[0].status, StepStatus::Failed);
    assert!(flow.tracker.steps[0]
        .observation
        .contains("is not available"));
    assert!(result.contains("is not available"));
}

//! Full interactive runs over the staged graph with persisted checkpoints

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use stride_agent::{
    AgentRole, AnalysisGraph, CheckpointStore, CodeExecutor, ExecutionResult, ExpertNodeConfig,
    FileCheckpointStore, GraphInput, HumanPrompt, MemoryCheckpointStore, RunOutcome,
    resume_with_hitl, run_with_hitl,
};
use stride_ai::{ChatModel, Content, Message, ModelRequest, ModelResponse, ModelSpec, Usage};

/// Replays assistant messages per system prompt
struct ScriptModel {
    spec: ModelSpec,
    scripts: Mutex<HashMap<String, VecDeque<Message>>>,
}

impl ScriptModel {
    fn new(scripts: Vec<(&str, Vec<Message>)>) -> Arc<Self> {
        Arc::new(Self {
            spec: ModelSpec::anthropic("script"),
            scripts: Mutex::new(
                scripts
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.into()))
                    .collect(),
            ),
        })
    }
}

#[async_trait]
impl ChatModel for ScriptModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    async fn invoke(&self, request: &ModelRequest) -> stride_ai::Result<ModelResponse> {
        let key = request.system_prompt.clone().unwrap_or_default();
        let message = self
            .scripts
            .lock()
            .get_mut(&key)
            .and_then(|s| s.pop_front())
            .ok_or_else(|| stride_ai::Error::UnexpectedResponse(format!("no reply for {key}")))?;
        Ok(ModelResponse {
            message,
            usage: Usage {
                input: 100,
                output: 20,
                ..Default::default()
            },
        })
    }
}

struct FixedExecutor;

#[async_trait]
impl CodeExecutor for FixedExecutor {
    async fn execute(&self, _code: &str) -> ExecutionResult {
        ExecutionResult::Success {
            html: "<div id=\"chart\"></div>".into(),
        }
    }
}

struct Answers {
    queue: Mutex<VecDeque<&'static str>>,
    asked: Mutex<Vec<String>>,
}

impl Answers {
    fn new(answers: &[&'static str]) -> Self {
        Self {
            queue: Mutex::new(answers.iter().copied().collect()),
            asked: Mutex::new(vec![]),
        }
    }
}

#[async_trait]
impl HumanPrompt for Answers {
    async fn ask(&self, question: &str) -> stride_agent::Result<String> {
        self.asked.lock().push(question.to_string());
        self.queue
            .lock()
            .pop_front()
            .map(str::to_string)
            .ok_or_else(|| stride_agent::Error::Other("out of answers".into()))
    }
}

fn ask(id: &str, question: &str) -> Message {
    Message::assistant(vec![Content::tool_call(
        id,
        "communicate_with_human",
        json!({ "message": question, "message_type": "question" }),
    )])
}

fn say(text: &str) -> Message {
    Message::assistant(vec![Content::text(text)])
}

fn plot(id: &str) -> Message {
    Message::assistant(vec![Content::tool_call(
        id,
        "python_plotting_tool",
        json!({ "python_code": "fig = go.Figure()", "description": "Weekly load" }),
    )])
}

fn expert(node: &str, display: &str, role: AgentRole, template: &str) -> ExpertNodeConfig {
    ExpertNodeConfig::new(node, display, role)
        .with_system_prompt(node)
        .with_user_prompt_template(template)
}

fn build(model: Arc<ScriptModel>, store: Arc<dyn CheckpointStore>) -> AnalysisGraph {
    AnalysisGraph::new(model, Arc::new(FixedExecutor), store)
        .with_stage(vec![
            expert("metrics", "Metrics Expert", AgentRole::Metrics, "{data}").with_plotting(true),
            expert("physiology", "Physiology Expert", AgentRole::Physiology, "{data}"),
        ])
        .with_stage(vec![expert(
            "synthesis",
            "Synthesis Expert",
            AgentRole::Synthesis,
            "{metrics_result}\n\n{physiology_result}",
        )])
}

fn input() -> GraphInput {
    GraphInput::new("athlete_1").with_var("data", "{\"ctl\": 60}")
}

#[tokio::test]
async fn test_concurrent_questions_are_answered_in_one_batch() {
    let model = ScriptModel::new(vec![
        (
            "metrics",
            vec![
                ask("m1", "What is your FTP?"),
                plot("m2"),
                say("Load is rising. [PLOT:PLACEHOLDER]"),
            ],
        ),
        (
            "physiology",
            vec![ask("p1", "How did you sleep?"), say("Recovery is fine.")],
        ),
        ("synthesis", vec![say("Keep building.")]),
    ]);
    let store = Arc::new(MemoryCheckpointStore::new());
    let graph = build(model, store.clone());
    let prompt = Answers::new(&["250W", "7 hours"]);

    let outcome = run_with_hitl(&graph, "thread-1", input(), &prompt, None)
        .await
        .unwrap();
    let RunOutcome::Completed(state) = outcome else {
        panic!("run was cancelled");
    };

    assert!(state.finished);
    assert!(state.errors.is_empty());
    assert_eq!(state.result("synthesis_result"), Some("Keep building."));
    assert_eq!(state.plots.len(), 1);
    assert_eq!(state.costs.len(), 3);
    assert!(state.cost_summary().total_tokens > 0);

    let asked = prompt.asked.lock();
    assert_eq!(asked.len(), 2);
    assert!(asked[0].starts_with("Question 1 [METRICS EXPERT]"));
    assert!(asked[1].starts_with("Question 2 [PHYSIOLOGY EXPERT]"));

    let checkpoint = store.load("thread-1").await.unwrap().unwrap();
    assert_eq!(checkpoint.version, 2);
    assert!(checkpoint.state.pending_interrupts().is_empty());
}

#[tokio::test]
async fn test_cancelled_run_resumes_from_file_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let scripts = || {
        vec![
            ("metrics", vec![ask("m1", "What is your FTP?"), say("FTP noted.")]),
            ("physiology", vec![say("Recovery is fine.")]),
            ("synthesis", vec![say("Plan ready.")]),
        ]
    };

    let store: Arc<dyn CheckpointStore> = Arc::new(FileCheckpointStore::new(dir.path()));
    let graph = build(ScriptModel::new(scripts()), store.clone());
    let prompt = Answers::new(&["exit"]);
    let outcome = run_with_hitl(&graph, "thread-2", input(), &prompt, None)
        .await
        .unwrap();
    assert!(outcome.is_cancelled());

    let parked = store.load("thread-2").await.unwrap().unwrap();
    assert_eq!(parked.state.pending_interrupts().len(), 1);
    assert_eq!(parked.state.result("physiology_result"), Some("Recovery is fine."));

    // A new process: fresh store handle and a model that only has the remaining replies
    let model = ScriptModel::new(vec![
        ("metrics", vec![say("FTP noted.")]),
        ("synthesis", vec![say("Plan ready.")]),
    ]);
    let store: Arc<dyn CheckpointStore> = Arc::new(FileCheckpointStore::new(dir.path()));
    let graph = build(model, store);
    let prompt = Answers::new(&["250W"]);
    let outcome = resume_with_hitl(&graph, "thread-2", &prompt, None)
        .await
        .unwrap();

    let RunOutcome::Completed(state) = outcome else {
        panic!("run was cancelled");
    };
    assert_eq!(state.result("metrics_result"), Some("FTP noted."));
    assert_eq!(state.result("synthesis_result"), Some("Plan ready."));
    assert!(prompt.asked.lock()[0].starts_with("AGENT COMMUNICATION [METRICS EXPERT]"));
}

#[tokio::test]
async fn test_second_question_from_same_expert_is_refused() {
    let model = ScriptModel::new(vec![
        (
            "metrics",
            vec![ask("m1", "FTP?"), ask("m2", "Weight?"), say("Done without weight.")],
        ),
        ("physiology", vec![say("ok")]),
        ("synthesis", vec![say("ok")]),
    ]);
    let graph = build(model, Arc::new(MemoryCheckpointStore::new()));
    let prompt = Answers::new(&["250W"]);

    let outcome = run_with_hitl(&graph, "thread-3", input(), &prompt, None)
        .await
        .unwrap();
    let RunOutcome::Completed(state) = outcome else {
        panic!("run was cancelled");
    };
    assert_eq!(prompt.asked.lock().len(), 1);
    assert_eq!(state.result("metrics_result"), Some("Done without weight."));
}

//! Staged graph of expert subgraphs with durable interrupts

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use stride_ai::ChatModel;
use tokio::sync::broadcast;

use crate::{
    checkpoint::{Checkpoint, CheckpointStore},
    config::{AgentRole, ExpertNodeConfig, render_template},
    cost::{CostEntry, CostSummary},
    error::{Error, Result},
    events::AgentEvent,
    executor::CodeExecutor,
    hitl::InterruptRecord,
    limiter::{DEFAULT_MAX_PLOTS, ToolUsageLimiter},
    plots::{PlotReferenceResolver, PlotStorage, ReferenceValidation, SharedPlotStorage},
    subgraph::{ExpertSubgraph, SubgraphOutcome, SubgraphState},
    tool::BoxedTool,
    tools::{PlotListTool, PlottingTool, ToolBox},
};

/// Answers keyed by interrupt id
pub type ResumeBundle = BTreeMap<String, serde_json::Value>;

/// Inputs of a fresh run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphInput {
    pub user_id: String,
    /// Values for `{placeholder}` slots in expert prompts
    pub vars: BTreeMap<String, String>,
}

impl GraphInput {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            vars: BTreeMap::new(),
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

/// What a step starts from
#[derive(Debug, Clone)]
pub enum StepInput {
    Start(GraphInput),
    Resume(ResumeBundle),
}

/// Where one expert branch stands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchStatus {
    Ready,
    Parked { interrupt: InterruptRecord },
    Completed { result: String },
    Failed { error: String },
}

impl BranchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BranchStatus::Completed { .. } | BranchStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchState {
    pub node: String,
    pub status: BranchStatus,
    /// Subgraph state while ready or parked; dropped once terminal
    pub subgraph: Option<SubgraphState>,
}

/// The whole state of one execution. This is what checkpoints hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    pub thread_id: String,
    /// Scope of the plot storage and limiters: `{user_id}_{timestamp}`
    pub execution_id: String,
    pub inputs: BTreeMap<String, String>,
    /// Index of the stage currently running
    pub stage: usize,
    /// Branches of the current stage, in configuration order
    pub branches: Vec<BranchState>,
    /// Final answers keyed by each expert's result key
    pub results: BTreeMap<String, String>,
    /// Node errors keyed by node name
    pub errors: BTreeMap<String, String>,
    pub costs: Vec<CostEntry>,
    pub plots: PlotStorage,
    pub plot_validation: BTreeMap<String, ReferenceValidation>,
    pub finished: bool,
}

impl GraphState {
    pub fn new(
        thread_id: impl Into<String>,
        execution_id: impl Into<String>,
        inputs: BTreeMap<String, String>,
    ) -> Self {
        let execution_id = execution_id.into();
        Self {
            thread_id: thread_id.into(),
            plots: PlotStorage::new(execution_id.clone()),
            execution_id,
            inputs,
            stage: 0,
            branches: vec![],
            results: BTreeMap::new(),
            errors: BTreeMap::new(),
            costs: vec![],
            plot_validation: BTreeMap::new(),
            finished: false,
        }
    }

    /// Parked interrupts in discovery order
    pub fn pending_interrupts(&self) -> Vec<InterruptRecord> {
        self.branches
            .iter()
            .filter_map(|b| match &b.status {
                BranchStatus::Parked { interrupt } => Some(interrupt.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn result(&self, key: &str) -> Option<&str> {
        self.results.get(key).map(String::as_str)
    }

    pub fn cost_summary(&self) -> CostSummary {
        CostSummary::from_entries(&self.costs)
    }

    /// Prompt variables: the run inputs plus every result so far
    fn vars(&self) -> BTreeMap<String, String> {
        let mut vars = self.inputs.clone();
        vars.extend(self.results.clone());
        vars
    }
}

/// Settings shared by every expert of a graph
#[derive(Debug, Clone)]
pub struct GraphSettings {
    pub max_plots: u32,
    pub strict_limits: bool,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            max_plots: DEFAULT_MAX_PLOTS,
            strict_limits: true,
        }
    }
}

/// Ordered stages of expert subgraphs.
///
/// Branches of a stage run concurrently. A stage starts once every branch
/// of the previous one has completed or failed. A paused branch parks
/// under a fresh interrupt id and the rest of the stage keeps going.
pub struct AnalysisGraph {
    stages: Vec<Vec<ExpertNodeConfig>>,
    model: Arc<dyn ChatModel>,
    role_models: HashMap<AgentRole, Arc<dyn ChatModel>>,
    executor: Arc<dyn CodeExecutor>,
    store: Arc<dyn CheckpointStore>,
    settings: GraphSettings,
    events: broadcast::Sender<AgentEvent>,
}

impl AnalysisGraph {
    pub fn new(
        model: Arc<dyn ChatModel>,
        executor: Arc<dyn CodeExecutor>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            stages: vec![],
            model,
            role_models: HashMap::new(),
            executor,
            store,
            settings: GraphSettings::default(),
            events,
        }
    }

    /// Append a stage of experts that run side by side
    pub fn with_stage(mut self, experts: Vec<ExpertNodeConfig>) -> Self {
        self.stages.push(experts);
        self
    }

    /// Use a different model for one role
    pub fn with_role_model(mut self, role: AgentRole, model: Arc<dyn ChatModel>) -> Self {
        self.role_models.insert(role, model);
        self
    }

    pub fn with_settings(mut self, settings: GraphSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Subscribe to graph events
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    fn expert(&self, node: &str) -> Result<&ExpertNodeConfig> {
        self.stages
            .iter()
            .flatten()
            .find(|c| c.node_name == node)
            .ok_or_else(|| Error::Checkpoint(format!("checkpoint names unknown node '{node}'")))
    }

    fn plotting_enabled(&self) -> bool {
        self.stages.iter().flatten().any(|c| c.plotting_enabled)
    }

    fn build_subgraph(&self, config: &ExpertNodeConfig, plots: &SharedPlotStorage) -> ExpertSubgraph {
        let tools: Vec<BoxedTool> = if config.plotting_enabled {
            vec![
                Arc::new(PlottingTool::new(
                    plots.clone(),
                    self.executor.clone(),
                    config.node_name.clone(),
                    self.settings.max_plots,
                )),
                Arc::new(PlotListTool::new(plots.clone())),
            ]
        } else {
            vec![]
        };
        ExpertSubgraph::new(
            config.clone(),
            self.model_for(config.agent_role).clone(),
            ToolBox::new(tools),
            self.events.clone(),
        )
    }

    fn model_for(&self, role: AgentRole) -> &Arc<dyn ChatModel> {
        self.role_models.get(&role).unwrap_or(&self.model)
    }

    fn new_branch(&self, config: &ExpertNodeConfig, vars: &BTreeMap<String, String>) -> BranchState {
        let limiter = if config.plotting_enabled {
            ToolUsageLimiter::plotting(self.settings.max_plots, self.settings.strict_limits)
        } else {
            ToolUsageLimiter::default()
        };
        let prompt = render_template(&config.user_prompt_template, vars);
        BranchState {
            node: config.node_name.clone(),
            status: BranchStatus::Ready,
            subgraph: Some(SubgraphState::new(prompt, limiter)),
        }
    }

    /// Take one step on a thread and persist the result.
    ///
    /// `Start` begins a fresh execution, replacing any checkpoint on the
    /// thread. `Resume` continues every parked branch whose interrupt id is
    /// in the bundle; other parked branches stay parked.
    pub async fn step(&self, thread_id: &str, input: StepInput) -> Result<GraphState> {
        let (mut state, version, resume) = match input {
            StepInput::Start(input) => {
                let execution_id = format!("{}_{}", input.user_id, chrono::Utc::now().timestamp());
                tracing::info!(thread_id, %execution_id, "Starting analysis graph");
                let mut state = GraphState::new(thread_id, execution_id, input.vars);
                state.inputs.insert("user_id".to_string(), input.user_id);
                (state, 0, ResumeBundle::new())
            }
            StepInput::Resume(bundle) => {
                let checkpoint = self
                    .store
                    .load(thread_id)
                    .await?
                    .ok_or_else(|| Error::UnknownThread(thread_id.to_string()))?;
                (checkpoint.state, checkpoint.version, bundle)
            }
        };

        let pending = state.pending_interrupts();
        if let Some(unknown) = resume
            .keys()
            .find(|id| !pending.iter().any(|p| &p.interrupt_id == *id))
        {
            return Err(Error::UnknownInterrupt(unknown.clone()));
        }

        let plots = state.plots.clone().shared();
        self.advance(&mut state, &plots, resume).await?;
        state.plots = plots.read().clone();

        if !state.finished && state.branches.iter().all(|b| b.status.is_terminal()) {
            self.finalize(&mut state);
        }

        self.store
            .save(&Checkpoint::new(thread_id, version + 1, state.clone()))
            .await?;
        Ok(state)
    }

    /// Run stages until one has parked branches or every stage is done
    async fn advance(
        &self,
        state: &mut GraphState,
        plots: &SharedPlotStorage,
        mut resume: ResumeBundle,
    ) -> Result<()> {
        while state.stage < self.stages.len() && !state.finished {
            if state.branches.is_empty() {
                let vars = state.vars();
                state.branches = self.stages[state.stage]
                    .iter()
                    .map(|config| self.new_branch(config, &vars))
                    .collect();
                let _ = self.events.send(AgentEvent::StageStart {
                    stage: state.stage,
                    nodes: state.branches.iter().map(|b| b.node.clone()).collect(),
                });
            }

            self.run_stage(state, plots, &mut resume).await?;

            if !state.branches.iter().all(|b| b.status.is_terminal()) {
                return Ok(());
            }
            state.stage += 1;
            state.branches.clear();
        }
        Ok(())
    }

    /// Run every ready branch and every parked branch with an answer, concurrently
    async fn run_stage(
        &self,
        state: &mut GraphState,
        plots: &SharedPlotStorage,
        resume: &mut ResumeBundle,
    ) -> Result<()> {
        let mut jobs = vec![];
        for (idx, branch) in state.branches.iter_mut().enumerate() {
            let answer = match &branch.status {
                BranchStatus::Ready => None,
                BranchStatus::Parked { interrupt } => match resume.remove(&interrupt.interrupt_id) {
                    Some(answer) => Some(answer),
                    None => continue,
                },
                _ => continue,
            };
            let Some(sub_state) = branch.subgraph.take() else {
                return Err(Error::Checkpoint(format!(
                    "branch '{}' has no subgraph state",
                    branch.node
                )));
            };
            let config = self.expert(&branch.node)?;
            jobs.push(async move {
                let subgraph = self.build_subgraph(config, plots);
                (idx, subgraph.step(sub_state, answer).await)
            });
        }

        for (idx, outcome) in join_all(jobs).await {
            let branch = &mut state.branches[idx];
            match outcome {
                Ok(SubgraphOutcome::Suspended {
                    state: sub_state,
                    request,
                }) => {
                    let interrupt_id = uuid::Uuid::new_v4().to_string();
                    let _ = self.events.send(AgentEvent::InterruptRaised {
                        node: branch.node.clone(),
                        interrupt_id: interrupt_id.clone(),
                        message: request.message.clone(),
                    });
                    branch.status = BranchStatus::Parked {
                        interrupt: InterruptRecord {
                            interrupt_id,
                            node: branch.node.clone(),
                            payload: request,
                        },
                    };
                    branch.subgraph = Some(sub_state);
                }
                Ok(SubgraphOutcome::Completed {
                    state: sub_state,
                    result,
                }) => {
                    let config = self.expert(&branch.node)?;
                    state.costs.push(CostEntry::new(
                        &branch.node,
                        self.model_for(config.agent_role).spec(),
                        sub_state.usage.clone(),
                        sub_state.elapsed_secs,
                    ));
                    let _ = self.events.send(AgentEvent::NodeEnd {
                        node: branch.node.clone(),
                        usage: sub_state.usage,
                    });
                    state
                        .results
                        .insert(config.state_result_key.clone(), result.clone());
                    branch.status = BranchStatus::Completed { result };
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!(node = %branch.node, "Expert failed: {}", e);
                    let _ = self.events.send(AgentEvent::NodeFailed {
                        node: branch.node.clone(),
                        error: e.to_string(),
                    });
                    state.errors.insert(branch.node.clone(), e.to_string());
                    branch.status = BranchStatus::Failed {
                        error: e.to_string(),
                    };
                }
            }
        }
        Ok(())
    }

    /// Resolve plot references in every result once all stages are done
    fn finalize(&self, state: &mut GraphState) {
        if self.plotting_enabled() {
            let resolver = PlotReferenceResolver::new(&state.plots);
            for (key, text) in state.results.iter_mut() {
                let validation = resolver.validate_plot_references(text);
                if validation.total_references > 0 {
                    *text = resolver.resolve_plot_references(text);
                }
                state.plot_validation.insert(key.clone(), validation);
            }
        }
        state.finished = true;
        tracing::info!(
            thread_id = %state.thread_id,
            results = state.results.len(),
            failures = state.errors.len(),
            cost = %state.cost_summary(),
            "Analysis graph finished"
        );
    }

    /// Interrupts currently parked on a thread
    pub async fn pending_interrupts(&self, thread_id: &str) -> Result<Vec<InterruptRecord>> {
        let checkpoint = self
            .store
            .load(thread_id)
            .await?
            .ok_or_else(|| Error::UnknownThread(thread_id.to_string()))?;
        Ok(checkpoint.state.pending_interrupts())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::executor::ExecutionResult;
    use crate::hitl::HUMAN_TOOL_NAME;
    use crate::testing::{MockModel, ask, calls, text};
    use async_trait::async_trait;
    use serde_json::json;

    struct HtmlExecutor;

    #[async_trait]
    impl CodeExecutor for HtmlExecutor {
        async fn execute(&self, _code: &str) -> ExecutionResult {
            ExecutionResult::Success {
                html: "<div>chart</div>".into(),
            }
        }
    }

    fn expert(name: &str, role: AgentRole, template: &str) -> ExpertNodeConfig {
        ExpertNodeConfig::new(name, format!("{name} expert"), role)
            .with_system_prompt(name)
            .with_user_prompt_template(template)
    }

    fn graph(model: Arc<MockModel>) -> (AnalysisGraph, Arc<MemoryCheckpointStore>) {
        let store = Arc::new(MemoryCheckpointStore::new());
        let graph = AnalysisGraph::new(model, Arc::new(HtmlExecutor), store.clone())
            .with_stage(vec![
                expert("metrics", AgentRole::Metrics, "Data: {data}").with_plotting(true),
                expert("activity", AgentRole::Activity, "Data: {data}"),
            ])
            .with_stage(vec![expert(
                "synthesis",
                AgentRole::Synthesis,
                "{metrics_result}\n{activity_result}",
            )]);
        (graph, store)
    }

    fn input() -> StepInput {
        StepInput::Start(GraphInput::new("u1").with_var("data", "5 runs"))
    }

    #[tokio::test]
    async fn test_runs_stages_and_renders_prompts() {
        let model = MockModel::keyed(vec![
            ("metrics", vec![text("load up")]),
            ("activity", vec![text("easy runs")]),
            ("synthesis", vec![text("summary")]),
        ]);
        let (graph, _) = graph(model.clone());

        let state = graph.step("t1", input()).await.unwrap();
        assert!(state.finished);
        assert!(state.pending_interrupts().is_empty());
        assert_eq!(state.result("synthesis_result"), Some("summary"));
        assert_eq!(state.costs.len(), 3);

        let requests = model.requests.lock();
        let synthesis = requests
            .iter()
            .find(|r| r.system_prompt.as_deref() == Some("synthesis"))
            .unwrap();
        assert_eq!(synthesis.messages[0].text(), "load up\neasy runs");
    }

    #[tokio::test]
    async fn test_parked_branch_waits_while_sibling_completes() {
        let model = MockModel::keyed(vec![
            ("metrics", vec![ask("h1", "FTP?"), text("FTP noted")]),
            ("activity", vec![text("easy runs")]),
            ("synthesis", vec![text("summary")]),
        ]);
        let (graph, store) = graph(model);

        let state = graph.step("t1", input()).await.unwrap();
        let pending = state.pending_interrupts();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].node, "metrics");
        assert_eq!(pending[0].payload.tool_call_id, "h1");
        assert_eq!(state.result("activity_result"), Some("easy runs"));
        assert!(!state.finished);
        assert_eq!(graph.pending_interrupts("t1").await.unwrap(), pending);

        let bundle = ResumeBundle::from([(pending[0].interrupt_id.clone(), json!({"content": "250W"}))]);
        let state = graph.step("t1", StepInput::Resume(bundle)).await.unwrap();
        assert!(state.finished);
        assert_eq!(state.result("metrics_result"), Some("FTP noted"));
        assert_eq!(state.result("synthesis_result"), Some("summary"));
        assert_eq!(store.load("t1").await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_partial_bundle_leaves_others_parked() {
        let model = MockModel::keyed(vec![
            ("metrics", vec![ask("h1", "FTP?"), text("m")]),
            ("activity", vec![ask("h2", "Long run day?"), text("a")]),
            ("synthesis", vec![text("s")]),
        ]);
        let (graph, _) = graph(model);

        let state = graph.step("t1", input()).await.unwrap();
        let pending = state.pending_interrupts();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].node, "metrics");
        assert_eq!(pending[1].node, "activity");
        assert_ne!(pending[0].interrupt_id, pending[1].interrupt_id);

        let bundle = ResumeBundle::from([(pending[1].interrupt_id.clone(), json!("Sunday"))]);
        let state = graph.step("t1", StepInput::Resume(bundle)).await.unwrap();
        let still = state.pending_interrupts();
        assert_eq!(still.len(), 1);
        assert_eq!(still[0].interrupt_id, pending[0].interrupt_id);
        assert_eq!(state.result("activity_result"), Some("a"));
    }

    #[tokio::test]
    async fn test_unknown_interrupt_and_thread_rejected() {
        let model = MockModel::keyed(vec![
            ("metrics", vec![ask("h1", "FTP?")]),
            ("activity", vec![text("a")]),
        ]);
        let (graph, _) = graph(model);

        let err = graph
            .step("missing", StepInput::Resume(ResumeBundle::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownThread(_)));

        graph.step("t1", input()).await.unwrap();
        let bundle = ResumeBundle::from([("bogus".to_string(), json!("x"))]);
        let err = graph.step("t1", StepInput::Resume(bundle)).await.unwrap_err();
        assert!(matches!(err, Error::UnknownInterrupt(id) if id == "bogus"));
    }

    #[tokio::test]
    async fn test_role_model_serves_and_prices_its_stage() {
        let default = MockModel::keyed(vec![
            ("metrics", vec![text("CTL 60")]),
            ("activity", vec![text("long runs")]),
            ("weekly_planner", vec![text("Mon rest")]),
        ]);
        let mut spec = stride_ai::ModelSpec::anthropic("planner-model");
        spec.cost = stride_ai::CostInfo {
            input: 3.0,
            output: 15.0,
            ..Default::default()
        };
        let planner = MockModel::with_spec(spec, vec![("", vec![text("Base then build")])]);

        let graph = AnalysisGraph::new(
            default.clone(),
            Arc::new(HtmlExecutor),
            Arc::new(MemoryCheckpointStore::new()),
        )
        .with_stage(vec![
            expert("metrics", AgentRole::Metrics, "{data}"),
            expert("activity", AgentRole::Activity, "{data}"),
        ])
        .with_stage(vec![
            expert(
                "season_planner",
                AgentRole::SeasonPlanner,
                "{metrics_result}|{activity_result}",
            )
            .with_result_key("season_plan"),
        ])
        .with_stage(vec![
            expert("weekly_planner", AgentRole::WeeklyPlanner, "Season: {season_plan}")
                .with_result_key("weekly_plan"),
        ])
        .with_role_model(AgentRole::SeasonPlanner, planner.clone());

        let state = graph.step("t1", input()).await.unwrap();
        assert!(state.finished);
        assert_eq!(state.result("season_plan"), Some("Base then build"));
        assert_eq!(state.result("weekly_plan"), Some("Mon rest"));

        assert_eq!(planner.calls(), 1);
        assert_eq!(
            planner.requests.lock()[0].messages[0].text(),
            "CTL 60|long runs"
        );
        assert_eq!(default.calls(), 3);
        let weekly = default
            .requests
            .lock()
            .iter()
            .find(|r| r.system_prompt.as_deref() == Some("weekly_planner"))
            .map(|r| r.messages[0].text())
            .unwrap();
        assert_eq!(weekly, "Season: Base then build");

        let season = state
            .costs
            .iter()
            .find(|c| c.agent == "season_planner")
            .unwrap();
        assert_eq!(season.model, "planner-model");
        // 10 input and 5 output tokens at $3 and $15 per million
        assert!((season.cost_usd - 0.000105).abs() < 1e-12);
        for entry in state.costs.iter().filter(|c| c.agent != "season_planner") {
            assert_eq!(entry.model, "mock");
            assert_eq!(entry.cost_usd, 0.0);
        }
    }

    #[tokio::test]
    async fn test_failed_node_does_not_stop_siblings() {
        let model = MockModel::keyed(vec![
            ("metrics", vec![]),
            ("activity", vec![text("a")]),
            ("synthesis", vec![text("s {metrics_result}")]),
        ]);
        let (graph, _) = graph(model);

        let state = graph.step("t1", input()).await.unwrap();
        assert!(state.finished);
        assert!(state.errors.contains_key("metrics"));
        assert_eq!(state.result("activity_result"), Some("a"));
        assert_eq!(state.result("synthesis_result"), Some("s {metrics_result}"));
    }

    #[tokio::test]
    async fn test_non_assistant_reply_marks_only_its_branch() {
        let model = MockModel::keyed(vec![
            ("metrics", vec![stride_ai::Message::user("echo")]),
            ("activity", vec![text("a")]),
            ("synthesis", vec![text("s")]),
        ]);
        let (graph, _) = graph(model);

        let state = graph.step("t1", input()).await.unwrap();
        assert!(state.finished);
        assert!(state.errors["metrics"].contains("user message"));
        assert_eq!(state.result("activity_result"), Some("a"));
        assert_eq!(state.result("synthesis_result"), Some("s"));
    }

    #[tokio::test]
    async fn test_plot_references_resolved_at_finish() {
        let model = MockModel::keyed(vec![
            (
                "metrics",
                vec![
                    calls(&[(
                        "p1",
                        "python_plotting_tool",
                        json!({"python_code": "fig = go.Figure()", "description": "CTL"}),
                    )]),
                    text("placeholder"),
                ],
            ),
            ("activity", vec![text("see [PLOT:ghost]")]),
            ("synthesis", vec![text("done")]),
        ]);
        let (graph, _) = graph(model);

        let state = graph.step("t1", input()).await.unwrap();
        assert_eq!(state.plots.len(), 1);
        let activity = state.result("activity_result").unwrap();
        assert!(activity.contains("plot-error"));
        assert!(!state.plot_validation["activity_result"].validation_passed);
        assert_eq!(state.plot_validation["metrics_result"].total_references, 0);
    }

    #[tokio::test]
    async fn test_hitl_tool_bound_for_every_expert() {
        let model = MockModel::keyed(vec![
            ("metrics", vec![text("m")]),
            ("activity", vec![text("a")]),
            ("synthesis", vec![text("s")]),
        ]);
        let (graph, _) = graph(model.clone());
        graph.step("t1", input()).await.unwrap();

        for request in model.requests.lock().iter() {
            assert_eq!(request.tools[0].name, HUMAN_TOOL_NAME);
            let plotting = request.system_prompt.as_deref() == Some("metrics");
            assert_eq!(request.tools.len(), if plotting { 3 } else { 1 });
        }
    }
}

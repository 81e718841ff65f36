//! stride - interactive multi-expert training analysis

mod config;
mod experts;
mod prompt;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use stride_agent::{
    AgentEvent, AnalysisGraph, CheckpointStore, FileCheckpointStore, FilePlanStorage, GraphInput,
    GraphSettings, GraphState, PlanStorage, RunOutcome, SubprocessExecutor,
    config::DEFAULT_MAX_ITERATIONS, resume_with_hitl, run_with_hitl,
};
use stride_ai::{ModelSpec, providers::AnthropicModel};
use tokio::sync::broadcast;

/// stride - training analysis by a team of AI coaching experts
#[derive(Parser, Debug)]
#[command(name = "stride")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// User id; reports are stored under it
    #[arg(short, long, default_value = "default")]
    user: String,

    /// Athlete name used in prompts (defaults to the user id)
    #[arg(short, long)]
    athlete: Option<String>,

    /// JSON file with the athlete's training data
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Free-form context for the analysis, e.g. goals or recent illness
    #[arg(short, long)]
    context: Option<String>,

    /// Resume an interrupted run by thread id
    #[arg(long)]
    resume: Option<String>,

    /// Let experts create plots
    #[arg(long)]
    plotting: bool,

    /// Also write a season plan and a 14-day training plan
    #[arg(long)]
    planning: bool,

    /// Run without asking the athlete any questions
    #[arg(long)]
    no_hitl: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Directory for finished reports (overrides storage_dir)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        tracing_subscriber::EnvFilter::new("stride=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if args.init_config {
        let path = config::Config::init().context("creating config file")?;
        println!("Config file created at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    let cfg = config::Config::load();

    let Some(api_key) = cfg.api_key() else {
        eprintln!("Error: No Anthropic API key found");
        eprintln!();
        eprintln!("  1. Set API key: export ANTHROPIC_API_KEY=your-key");
        eprintln!("  2. Add to config: stride --init-config");
        std::process::exit(1);
    };

    let model_for = |id: &str| {
        let mut spec = ModelSpec::anthropic(id);
        if let Some(max_tokens) = cfg.max_tokens {
            spec.max_tokens = max_tokens;
        }
        Arc::new(AnthropicModel::new(api_key.clone(), spec))
    };
    let model = model_for(cfg.model_id());
    let executor = Arc::new(SubprocessExecutor::new(cfg.python(), cfg.executor_timeout()));
    let store = Arc::new(FileCheckpointStore::new(cfg.checkpoint_dir()));

    let max_plots = cfg
        .max_plots
        .unwrap_or(stride_agent::limiter::DEFAULT_MAX_PLOTS);
    let options = experts::RosterOptions {
        plotting: args.plotting || cfg.plotting.unwrap_or(false),
        hitl: !args.no_hitl,
        max_iterations: cfg.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
        max_plots,
        planning: args.planning || cfg.planning.unwrap_or(false),
    };
    let mut graph = experts::roster(options).into_iter().fold(
        AnalysisGraph::new(model, executor, store.clone()).with_settings(GraphSettings {
            max_plots,
            strict_limits: cfg.strict_limits.unwrap_or(true),
        }),
        AnalysisGraph::with_stage,
    );
    for (role, id) in cfg.role_model_ids() {
        tracing::info!("Using {} for the {} role", id, role);
        graph = graph.with_role_model(role, model_for(id));
    }
    let plans = FilePlanStorage::new(args.output.clone().unwrap_or_else(|| cfg.storage_dir()));

    let printer = tokio::spawn(print_events(graph.subscribe()));
    let prompt = prompt::StdinPrompt;
    let progress = |line: &str| println!("{line}");

    let (thread_id, outcome) = match args.resume.clone() {
        Some(thread_id) => {
            println!("Resuming analysis {thread_id}");
            let outcome = resume_with_hitl(&graph, &thread_id, &prompt, Some(&progress)).await?;
            (thread_id, outcome)
        }
        None => {
            let thread_id = uuid::Uuid::new_v4().to_string();
            let mut input = build_input(&args)?;
            if options.planning {
                input = with_planning_vars(input, &plans, chrono::Local::now().date_naive())
                    .await?;
            }
            println!("Starting analysis {thread_id} for {}", args.user);
            let outcome =
                run_with_hitl(&graph, &thread_id, input, &prompt, Some(&progress)).await?;
            (thread_id, outcome)
        }
    };
    printer.abort();

    match outcome {
        RunOutcome::Completed(state) => {
            save_reports(&plans, &state).await?;
            println!("\nReports saved under {}", plans.base_dir().display());
            println!("Cost: {}", state.cost_summary());
        }
        RunOutcome::Cancelled => {
            println!("\nAnalysis cancelled.");
        }
    }
    store.delete(&thread_id).await?;

    Ok(())
}

fn build_input(args: &Args) -> anyhow::Result<GraphInput> {
    let data = match &args.data {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => Value::Null,
    };

    let mut input = GraphInput::new(&args.user);
    input.vars = data_vars(&data);
    Ok(input
        .with_var("athlete_name", args.athlete.as_deref().unwrap_or(&args.user))
        .with_var("analysis_context", args.context.as_deref().unwrap_or("None given"))
        .with_var(
            "current_date",
            chrono::Local::now().format("%Y-%m-%d").to_string(),
        ))
}

/// Variables the planners read. The last saved season plan is handed to the
/// season planner so it revises instead of starting over.
async fn with_planning_vars(
    input: GraphInput,
    storage: &dyn PlanStorage,
    today: chrono::NaiveDate,
) -> anyhow::Result<GraphInput> {
    let previous = storage
        .load_plan(&input.user_id, "season_plan")
        .await?
        .unwrap_or_else(|| "None saved".to_string());
    let week_dates = (1..=14)
        .map(|offset| (today + chrono::Days::new(offset)).format("%a %Y-%m-%d").to_string())
        .collect::<Vec<_>>()
        .join("\n");
    let context = input
        .vars
        .get("analysis_context")
        .cloned()
        .unwrap_or_default();

    let mut input = input
        .with_var("previous_season_plan", previous)
        .with_var("week_dates", week_dates)
        .with_var("planning_context", context);
    input
        .vars
        .entry("competitions".to_string())
        .or_insert_with(|| "None listed".to_string());
    Ok(input)
}

/// `data` holds the whole document; each top-level key is also its own variable
fn data_vars(data: &Value) -> BTreeMap<String, String> {
    let render = |v: &Value| match v {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };

    let mut vars = BTreeMap::new();
    if let Value::Object(map) = data {
        for (key, value) in map {
            vars.insert(key.clone(), render(value));
        }
    }
    let whole = if data.is_null() {
        "No data provided".to_string()
    } else {
        render(data)
    };
    vars.insert("data".to_string(), whole);
    vars
}

async fn save_reports(storage: &dyn PlanStorage, state: &GraphState) -> anyhow::Result<()> {
    let user = state
        .inputs
        .get("user_id")
        .map(String::as_str)
        .unwrap_or("default");

    // season_plan and weekly_plan keep their key as plan type
    for (key, text) in &state.results {
        let plan_type = key.trim_end_matches("_result");
        let plan_type = if plan_type == "synthesis" { "analysis" } else { plan_type };
        storage.save_plan(user, plan_type, text).await?;
    }
    for (key, validation) in &state.plot_validation {
        if !validation.validation_passed {
            eprintln!(
                "Warning: {} references missing plots: {:?}",
                key, validation.missing_plots
            );
        }
    }
    for (node, error) in &state.errors {
        eprintln!("Warning: {node} failed: {error}");
    }
    Ok(())
}

async fn print_events(mut receiver: broadcast::Receiver<AgentEvent>) {
    loop {
        let event = match receiver.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            AgentEvent::StageStart { stage, nodes } => {
                println!("\n[Stage {}: {}]", stage + 1, nodes.join(", "));
            }
            AgentEvent::ToolExecutionStart {
                node, tool_name, ..
            } if tool_name != stride_agent::hitl::HUMAN_TOOL_NAME => {
                println!("[{node}: running {tool_name}...]");
            }
            AgentEvent::ToolExecutionEnd {
                node,
                tool_name,
                result,
                is_error: true,
                ..
            } => {
                println!("[{node}: {tool_name} failed: {}]", truncate(&result, 200));
            }
            AgentEvent::NodeEnd { node, usage } => {
                println!("[{node} done: {} in, {} out]", usage.input, usage.output);
            }
            AgentEvent::NodeFailed { node, error } => {
                eprintln!("[{node} failed: {error}]");
            }
            other => tracing::debug!(?other, "graph event"),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

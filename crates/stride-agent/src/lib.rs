//! stride-agent: expert agent graph with human-in-the-loop interrupts
//!
//! Each expert is a small state machine that calls a model, runs tools and
//! pauses when it wants to talk to the athlete. Experts run in stages; paused
//! experts are checkpointed and resumed by interrupt id.

pub mod checkpoint;
pub mod config;
pub mod cost;
pub mod error;
pub mod events;
pub mod executor;
pub mod graph;
pub mod hitl;
pub mod limiter;
pub mod plans;
pub mod plots;
pub mod routing;
pub mod runner;
pub mod state;
pub mod subgraph;
pub mod tool;
pub mod tools;

#[cfg(test)]
mod testing;

pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::{AgentRole, ExpertNodeConfig};
pub use cost::{CostEntry, CostSummary};
pub use error::{Error, Result};
pub use events::AgentEvent;
pub use executor::{CodeExecutor, ExecutionResult, SubprocessExecutor};
pub use graph::{
    AnalysisGraph, BranchStatus, GraphInput, GraphSettings, GraphState, ResumeBundle, StepInput,
};
pub use hitl::{HumanRequest, InterruptRecord, MessageType};
pub use limiter::ToolUsageLimiter;
pub use plans::{FilePlanStorage, PlanStorage};
pub use plots::{PlotReferenceResolver, PlotStorage};
pub use runner::{
    HumanPrompt, InterruptibleGraph, RunOutcome, format_question, resume_with_hitl, run_with_hitl,
};
pub use subgraph::{ExpertSubgraph, SubgraphOutcome, SubgraphState};
pub use tool::{Tool, ToolResult};

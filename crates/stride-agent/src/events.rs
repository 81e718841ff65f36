//! Graph event types

use serde::{Deserialize, Serialize};
use stride_ai::Usage;

/// Events emitted while the graph and its expert subgraphs run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A stage of concurrent expert branches started
    StageStart { stage: usize, nodes: Vec<String> },

    /// An expert subgraph started or resumed
    NodeStart { node: String },

    /// A model call is about to be made
    ModelCallStart { node: String, call_number: u32 },

    /// A model call returned
    ModelCallEnd {
        node: String,
        tool_calls: usize,
        usage: Usage,
    },

    /// Tool execution started
    ToolExecutionStart {
        node: String,
        tool_call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// Tool execution completed
    ToolExecutionEnd {
        node: String,
        tool_call_id: String,
        tool_name: String,
        result: String,
        is_error: bool,
    },

    /// A subgraph parked waiting for a human answer
    InterruptRaised {
        node: String,
        interrupt_id: String,
        message: String,
    },

    /// A subgraph finished
    NodeEnd { node: String, usage: Usage },

    /// A subgraph failed; siblings keep running
    NodeFailed { node: String, error: String },
}

impl AgentEvent {
    /// Node the event belongs to, if any
    pub fn node(&self) -> Option<&str> {
        match self {
            AgentEvent::StageStart { .. } => None,
            AgentEvent::NodeStart { node }
            | AgentEvent::ModelCallStart { node, .. }
            | AgentEvent::ModelCallEnd { node, .. }
            | AgentEvent::ToolExecutionStart { node, .. }
            | AgentEvent::ToolExecutionEnd { node, .. }
            | AgentEvent::InterruptRaised { node, .. }
            | AgentEvent::NodeEnd { node, .. }
            | AgentEvent::NodeFailed { node, .. } => Some(node),
        }
    }
}

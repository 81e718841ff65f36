//! Pure routing over the last assistant message

use stride_ai::{Message, ToolCall};

use crate::hitl::HUMAN_TOOL_NAME;

/// Where a subgraph goes after a model call
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    /// No tool calls: the subgraph is done
    End,
    /// Pause for the human. `deferred` holds every other call in the same
    /// message; they are answered as deferred, not executed.
    Hitl {
        call: ToolCall,
        deferred: Vec<ToolCall>,
    },
    /// Execute the calls in order
    Tools { calls: Vec<ToolCall> },
}

/// Decide the next phase from the latest assistant message.
///
/// A human-communication call wins over other calls in the same message.
/// Once the human budget is spent, such calls go to the tools phase, which
/// answers them with an error.
pub fn route(message: &Message, human_budget_left: bool) -> RouteDecision {
    let calls = message.tool_calls();
    if calls.is_empty() {
        return RouteDecision::End;
    }

    if human_budget_left {
        if let Some(pos) = calls.iter().position(|c| c.name == HUMAN_TOOL_NAME) {
            let mut deferred = calls;
            let call = deferred.remove(pos);
            return RouteDecision::Hitl { call, deferred };
        }
    }

    RouteDecision::Tools { calls }
}

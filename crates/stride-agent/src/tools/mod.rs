//! Standard tool dispatch and the plotting tools

pub mod plotting;

pub use plotting::{PlotListTool, PlottingTool};

use std::collections::HashMap;
use std::sync::Arc;
use stride_ai::{ToolCall, ToolDefinition};
use tokio::sync::broadcast;

use crate::{
    events::AgentEvent,
    hitl::HUMAN_TOOL_NAME,
    limiter::ToolUsageLimiter,
    tool::{BoxedTool, ToolResult, to_definition},
};

/// Answer for human-communication calls once the budget is spent
pub const HUMAN_LIMIT_MESSAGE: &str = "Human interaction limit reached for this analysis. \
     Do not ask again; proceed with the data you have.";

/// The standard tools bound to one expert, with cached argument validators
#[derive(Default, Clone)]
pub struct ToolBox {
    tools: Vec<BoxedTool>,
    schema_cache: HashMap<String, Arc<jsonschema::Validator>>,
}

impl ToolBox {
    pub fn new(tools: Vec<BoxedTool>) -> Self {
        let mut toolbox = Self::default();
        for tool in tools {
            toolbox.add_tool(tool);
        }
        toolbox
    }

    /// Add a tool, compiling its parameter schema once
    pub fn add_tool(&mut self, tool: BoxedTool) {
        let schema = tool.parameters_schema();
        match jsonschema::validator_for(&schema) {
            Ok(validator) => {
                self.schema_cache
                    .insert(tool.name().to_string(), Arc::new(validator));
            }
            Err(e) => {
                tracing::warn!(
                    "Invalid tool parameter schema for '{}', skipping validation: {}",
                    tool.name(),
                    e
                );
            }
        }
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&BoxedTool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| to_definition(t.as_ref())).collect()
    }

    /// Run one call and turn every failure into an error result.
    ///
    /// The limiter sees the call before the tool does; a rejected call
    /// never reaches the tool.
    pub async fn execute(
        &self,
        node: &str,
        call: &ToolCall,
        limiter: &mut ToolUsageLimiter,
        events: &broadcast::Sender<AgentEvent>,
    ) -> ToolResult {
        let _ = events.send(AgentEvent::ToolExecutionStart {
            node: node.to_string(),
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
        });

        let result = self.run(node, call, limiter).await;

        let _ = events.send(AgentEvent::ToolExecutionEnd {
            node: node.to_string(),
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            result: result.text_content(),
            is_error: result.is_error,
        });
        result
    }

    async fn run(&self, node: &str, call: &ToolCall, limiter: &mut ToolUsageLimiter) -> ToolResult {
        if call.name == HUMAN_TOOL_NAME {
            tracing::warn!(node, "Human interaction requested past limit");
            return ToolResult::error(HUMAN_LIMIT_MESSAGE);
        }

        let Some(tool) = self.get(&call.name) else {
            return ToolResult::error(format!("Tool not found: {}", call.name));
        };

        if let Err(e) = limiter.on_tool_start(&call.name) {
            return ToolResult::error(format!(
                "{e}. Consider creating fewer, more comprehensive visualizations."
            ));
        }

        if let Some(err) = self
            .schema_cache
            .get(&call.name)
            .and_then(|validator| validate_with_validator(&call.arguments, validator))
        {
            return ToolResult::error(err);
        }

        let tool = tool.clone();
        let id = call.id.clone();
        let args = call.arguments.clone();
        match tokio::spawn(async move { tool.execute(&id, args).await }).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(node, tool = %call.name, "Tool task failed: {}", e);
                ToolResult::error(format!("Tool '{}' failed: {}", call.name, e))
            }
        }
    }
}

/// Validate tool arguments using a pre-compiled validator.
/// Returns `Some(error_message)` if validation fails, `None` if valid.
fn validate_with_validator(
    args: &serde_json::Value,
    validator: &jsonschema::Validator,
) -> Option<String> {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Tool argument validation failed:\n{}",
            errors.join("\n")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::Tool;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingTool {
        name: &'static str,
        calls: Arc<AtomicU32>,
        panic: bool,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "counts"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "n": { "type": "integer" } }
            })
        }
        async fn execute(&self, _id: &str, _args: serde_json::Value) -> ToolResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("tool blew up");
            }
            ToolResult::text("ok")
        }
    }

    fn toolbox(name: &'static str, panic: bool) -> (ToolBox, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let tool = CountingTool {
            name,
            calls: calls.clone(),
            panic,
        };
        (ToolBox::new(vec![Arc::new(tool)]), calls)
    }

    #[tokio::test]
    async fn test_limiter_blocks_before_tool_runs() {
        let (toolbox, calls) = toolbox("python_plotting_tool", false);
        let mut limiter = ToolUsageLimiter::plotting(1, true);
        let (tx, _rx) = broadcast::channel(16);
        let call = ToolCall::new("c1", "python_plotting_tool", serde_json::json!({}));

        assert!(!toolbox.execute("metrics", &call, &mut limiter, &tx).await.is_error);
        let second = toolbox.execute("metrics", &call, &mut limiter, &tx).await;
        assert!(second.is_error);
        assert!(second.text_content().contains("usage limit exceeded"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_arguments_rejected() {
        let (toolbox, calls) = toolbox("count", false);
        let mut limiter = ToolUsageLimiter::default();
        let (tx, _rx) = broadcast::channel(16);
        let call = ToolCall::new("c1", "count", serde_json::json!({"n": "three"}));

        let result = toolbox.execute("metrics", &call, &mut limiter, &tx).await;
        assert!(result.is_error);
        assert!(result.text_content().contains("validation failed"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_tool_becomes_error_result() {
        let (toolbox, _) = toolbox("count", true);
        let mut limiter = ToolUsageLimiter::default();
        let (tx, _rx) = broadcast::channel(16);
        let call = ToolCall::new("c1", "count", serde_json::json!({}));

        let result = toolbox.execute("metrics", &call, &mut limiter, &tx).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_unknown_and_human_calls() {
        let (toolbox, _) = toolbox("count", false);
        let mut limiter = ToolUsageLimiter::default();
        let (tx, mut rx) = broadcast::channel(16);

        let missing = ToolCall::new("c1", "nope", serde_json::json!({}));
        let result = toolbox.execute("metrics", &missing, &mut limiter, &tx).await;
        assert_eq!(result.text_content(), "Tool not found: nope");

        let human = ToolCall::new("c2", HUMAN_TOOL_NAME, serde_json::json!({}));
        let result = toolbox.execute("metrics", &human, &mut limiter, &tx).await;
        assert_eq!(result.text_content(), HUMAN_LIMIT_MESSAGE);

        assert!(matches!(
            rx.recv().await.unwrap(),
            AgentEvent::ToolExecutionStart { .. }
        ));
    }
}

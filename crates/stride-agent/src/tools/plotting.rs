//! Plot creation and listing tools

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::{
    executor::{CodeExecutor, ExecutionErrorKind, ExecutionResult},
    limiter::{PLOT_LIST_TOOL_NAME, PLOTTING_TOOL_NAME},
    plots::{SharedPlotStorage, resolver::plot_token},
    tool::{Tool, ToolResult},
};

const MISSING_CODE_MESSAGE: &str = "Error: Missing required parameter 'python_code'.\n\n\
Please provide complete Python code including imports, data handling, and plotting \
that creates a 'fig' variable, then try again.";

const MISSING_DESCRIPTION_MESSAGE: &str = "Error: Missing required parameter 'description'.\n\n\
Please provide a brief description of what the plot shows, for example \
'Training load progression over the last 6 weeks', then try again.";

/// Executes agent-written plotting code and stores the resulting figure
pub struct PlottingTool {
    storage: SharedPlotStorage,
    executor: Arc<dyn CodeExecutor>,
    agent_name: String,
    max_plots: usize,
    description: String,
}

impl PlottingTool {
    pub fn new(
        storage: SharedPlotStorage,
        executor: Arc<dyn CodeExecutor>,
        agent_name: impl Into<String>,
        max_plots: u32,
    ) -> Self {
        let description = format!(
            "Execute complete Python code to create an interactive Plotly visualization.\n\n\
             LIMIT: at most {max_plots} plots per agent. Only plot insights that add value \
             beyond standard training app charts.\n\n\
             plotly.graph_objects (go), plotly.express (px), make_subplots, pandas (pd) and \
             numpy (np) are available. The code MUST assign the figure to a variable named \
             'fig'. File access, process spawning, eval/exec and __import__ are rejected.\n\n\
             On success returns a plot id; reference it in your text as [PLOT:plot_id]. \
             On error returns guidance for fixing the code."
        );
        Self {
            storage,
            executor,
            agent_name: agent_name.into(),
            max_plots: max_plots as usize,
            description,
        }
    }

    fn limit_message(&self, count: usize) -> String {
        format!(
            "Plot limit reached: Agent '{}' has already created {} plots (maximum: {}).\n\n\
             Consider whether this visualization is truly necessary or if you can:\n\
             1. Reference existing plots using [PLOT:plot_id] syntax\n\
             2. Incorporate insights into your text analysis instead\n\
             3. Combine multiple insights into a single, comprehensive visualization.",
            self.agent_name, count, self.max_plots
        )
    }
}

fn non_blank<'a>(args: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

#[async_trait]
impl Tool for PlottingTool {
    fn name(&self) -> &str {
        PLOTTING_TOOL_NAME
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "python_code": {
                    "type": "string",
                    "description": "Complete Python code including imports, data creation/processing, and plotting that creates a 'fig' variable"
                },
                "description": {
                    "type": "string",
                    "description": "Brief description of what the plot shows"
                },
                "data_summary": {
                    "type": "string",
                    "description": "Optional short note on the data behind the plot"
                }
            },
            "required": ["python_code", "description"]
        })
    }

    async fn execute(&self, _tool_call_id: &str, arguments: serde_json::Value) -> ToolResult {
        let count = self.storage.read().count_for_agent(&self.agent_name);
        if count >= self.max_plots {
            tracing::warn!(agent = %self.agent_name, count, "Plot limit reached");
            return ToolResult::error(self.limit_message(count))
                .with_details(json!({ "error_type": "plot_limit_exceeded" }));
        }

        let Some(code) = non_blank(&arguments, "python_code") else {
            return ToolResult::error(MISSING_CODE_MESSAGE)
                .with_details(json!({ "error_type": "missing_python_code" }));
        };
        let Some(description) = non_blank(&arguments, "description") else {
            return ToolResult::error(MISSING_DESCRIPTION_MESSAGE)
                .with_details(json!({ "error_type": "missing_description" }));
        };
        let data_summary = arguments
            .get("data_summary")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        tracing::info!("Agent {} executing plotting code", self.agent_name);
        let html = match self.executor.execute(code).await {
            ExecutionResult::Success { html } => html,
            ExecutionResult::Failure {
                kind: ExecutionErrorKind::Conversion,
                message,
            } => {
                tracing::error!("Agent {} plot conversion failed: {}", self.agent_name, message);
                return ToolResult::error(format!(
                    "Error converting plot to HTML: {message}\n\n\
                     Make sure your code assigns a valid Plotly figure to a variable named 'fig'."
                ))
                .with_details(json!({ "error_type": "conversion_error" }));
            }
            ExecutionResult::Failure { kind, message } => {
                tracing::error!("Agent {} plotting failed: {}", self.agent_name, message);
                return ToolResult::error(format!(
                    "Error executing plotting code: {message}\n\n\
                     Please fix the following issues and try again:\n\
                     1. Check for syntax errors in your Python code\n\
                     2. Ensure all required libraries are imported\n\
                     3. Verify that your code creates a 'fig' variable with a valid Plotly figure\n\
                     4. Check that all data references are correctly defined"
                ))
                .with_details(json!({ "error_type": "execution_error", "kind": kind }));
            }
        };

        let plot_id =
            self.storage
                .write()
                .store_plot(html, description, &self.agent_name, data_summary);

        ToolResult::text(format!(
            "Plot created successfully! Reference as {}",
            plot_token(&plot_id)
        ))
        .with_details(json!({ "plot_id": plot_id }))
    }
}

/// Lists the plots stored so far in this execution
pub struct PlotListTool {
    storage: SharedPlotStorage,
}

impl PlotListTool {
    pub fn new(storage: SharedPlotStorage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Tool for PlotListTool {
    fn name(&self) -> &str {
        PLOT_LIST_TOOL_NAME
    }

    fn description(&self) -> &str {
        "List all plots available for referencing in your analysis. Plots created by \
         other agents can be referenced with [PLOT:plot_id] syntax in your text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _tool_call_id: &str, _arguments: serde_json::Value) -> ToolResult {
        let storage = self.storage.read();
        let plots = storage.list_available_plots();
        if plots.is_empty() {
            return ToolResult::text("No plots available yet.");
        }

        let mut lines = vec!["Available plots for referencing:".to_string()];
        for plot in plots {
            let mut line = format!(
                "- {}: {} (by {}",
                plot_token(&plot.plot_id),
                plot.description,
                plot.agent_name
            );
            if !plot.data_summary.is_empty() {
                line.push_str(&format!(", data: {}", plot.data_summary));
            }
            line.push(')');
            lines.push(line);
        }
        ToolResult::text(lines.join("\n"))
    }
}

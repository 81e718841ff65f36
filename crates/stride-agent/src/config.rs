//! Expert node configuration

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("valid placeholder regex"));

/// Default cap on model calls per subgraph run
pub const DEFAULT_MAX_ITERATIONS: u32 = 15;
/// Default number of human questions per subgraph
pub const DEFAULT_MAX_HUMAN_INTERACTIONS: u32 = 1;

/// Specialist role of an expert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Metrics,
    Activity,
    Physiology,
    Synthesis,
    SeasonPlanner,
    WeeklyPlanner,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Metrics => "metrics",
            AgentRole::Activity => "activity",
            AgentRole::Physiology => "physiology",
            AgentRole::Synthesis => "synthesis",
            AgentRole::SeasonPlanner => "season_planner",
            AgentRole::WeeklyPlanner => "weekly_planner",
        }
    }
}

impl std::str::FromStr for AgentRole {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| crate::error::Error::Other(format!("unknown agent role: {s}")))
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one expert subgraph. Not changed once a graph is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertNodeConfig {
    /// Unique node name, also used as the plot agent name
    pub node_name: String,
    /// Name shown to the human
    pub display_name: String,
    pub agent_role: AgentRole,
    pub system_prompt: String,
    /// User prompt with `{placeholder}` slots filled from graph inputs
    pub user_prompt_template: String,
    /// Key under which the final answer is stored
    pub state_result_key: String,
    pub plotting_enabled: bool,
    pub max_iterations: u32,
    pub max_human_interactions: u32,
}

impl ExpertNodeConfig {
    pub fn new(
        node_name: impl Into<String>,
        display_name: impl Into<String>,
        agent_role: AgentRole,
    ) -> Self {
        let node_name = node_name.into();
        Self {
            state_result_key: format!("{node_name}_result"),
            node_name,
            display_name: display_name.into(),
            agent_role,
            system_prompt: String::new(),
            user_prompt_template: String::new(),
            plotting_enabled: false,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_human_interactions: DEFAULT_MAX_HUMAN_INTERACTIONS,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_user_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.user_prompt_template = template.into();
        self
    }

    pub fn with_result_key(mut self, key: impl Into<String>) -> Self {
        self.state_result_key = key.into();
        self
    }

    pub fn with_plotting(mut self, enabled: bool) -> Self {
        self.plotting_enabled = enabled;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_human_interactions(mut self, max: u32) -> Self {
        self.max_human_interactions = max;
        self
    }

    /// Fill `{key}` placeholders. Unknown placeholders are left as written.
    pub fn render_user_prompt(&self, vars: &BTreeMap<String, String>) -> String {
        render_template(&self.user_prompt_template, vars)
    }
}

/// Single pass; text coming from a variable is never scanned again
pub(crate) fn render_template(template: &str, vars: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

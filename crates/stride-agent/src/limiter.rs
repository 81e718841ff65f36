//! Per-agent tool usage limits

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Name of the plot-creating tool
pub const PLOTTING_TOOL_NAME: &str = "python_plotting_tool";
/// Name of the plot-listing tool
pub const PLOT_LIST_TOOL_NAME: &str = "list_available_plots";

/// Default number of plots an agent may create
pub const DEFAULT_MAX_PLOTS: u32 = 2;
/// Default number of plot listings an agent may request
pub const DEFAULT_MAX_PLOT_LISTINGS: u32 = 10;

/// Usage of one bounded tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStat {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
}

/// Counts calls to bounded tools and rejects calls past their limit.
///
/// One limiter belongs to one agent; it is saved with the agent's
/// subgraph state so counts survive a pause. Counters only move back to
/// zero through [`ToolUsageLimiter::reset_counts`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolUsageLimiter {
    limits: BTreeMap<String, u32>,
    counts: BTreeMap<String, u32>,
    strict: bool,
}

impl ToolUsageLimiter {
    /// Create a limiter over the given tool limits
    pub fn new(limits: impl IntoIterator<Item = (String, u32)>, strict: bool) -> Self {
        let limits: BTreeMap<String, u32> = limits.into_iter().collect();
        let counts = limits.keys().map(|name| (name.clone(), 0)).collect();
        tracing::debug!(?limits, strict, "Initialized tool usage limiter");
        Self {
            limits,
            counts,
            strict,
        }
    }

    /// Limiter for the plotting tools
    pub fn plotting(max_plots: u32, strict: bool) -> Self {
        Self::new(
            [
                (PLOTTING_TOOL_NAME.to_string(), max_plots),
                (PLOT_LIST_TOOL_NAME.to_string(), DEFAULT_MAX_PLOT_LISTINGS),
            ],
            strict,
        )
    }

    /// Record that a tool is about to run.
    ///
    /// Unbounded tools always pass. Bounded tools are counted first; a count
    /// past the limit is an error in strict mode and a warning otherwise.
    pub fn on_tool_start(&mut self, tool_name: &str) -> Result<()> {
        let Some(&limit) = self.limits.get(tool_name) else {
            return Ok(());
        };
        let count = self.counts.entry(tool_name.to_string()).or_insert(0);
        *count += 1;
        let used = *count;
        tracing::info!("Tool '{}' usage: {}/{}", tool_name, used, limit);

        if used > limit {
            if self.strict {
                tracing::error!(tool = tool_name, used, limit, "Tool usage limit exceeded");
                return Err(Error::ToolUsageExceeded {
                    tool: tool_name.to_string(),
                    used,
                    limit,
                });
            }
            tracing::warn!(tool = tool_name, used, limit, "Tool usage over limit");
        } else if used == limit {
            tracing::warn!(
                "Tool '{}' has reached its limit ({}). Next usage will be blocked.",
                tool_name,
                limit
            );
        }
        Ok(())
    }

    /// Current count for a tool
    pub fn count(&self, tool_name: &str) -> u32 {
        self.counts.get(tool_name).copied().unwrap_or(0)
    }

    /// Usage statistics for every bounded tool
    pub fn usage_stats(&self) -> BTreeMap<String, UsageStat> {
        self.limits
            .iter()
            .map(|(name, &limit)| {
                let used = self.count(name);
                (
                    name.clone(),
                    UsageStat {
                        used,
                        limit,
                        remaining: limit.saturating_sub(used),
                    },
                )
            })
            .collect()
    }

    /// Reset every counter to zero
    pub fn reset_counts(&mut self) {
        for count in self.counts.values_mut() {
            *count = 0;
        }
        tracing::info!("Reset all tool usage counters");
    }
}

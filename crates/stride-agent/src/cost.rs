//! Model usage and cost accounting per expert

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use stride_ai::{ModelSpec, Usage};

/// Usage of one expert over one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub agent: String,
    /// Model that served the expert
    #[serde(default)]
    pub model: String,
    pub execution_time_secs: f64,
    pub usage: Usage,
    pub cost_usd: f64,
    pub timestamp: DateTime<Utc>,
}

impl CostEntry {
    /// Price `usage` with the rates of `model`
    pub fn new(
        agent: impl Into<String>,
        model: &ModelSpec,
        usage: Usage,
        execution_time_secs: f64,
    ) -> Self {
        let cost_usd = usage.calculate_cost(&model.cost);
        Self {
            agent: agent.into(),
            model: model.id.clone(),
            execution_time_secs,
            usage,
            cost_usd,
            timestamp: Utc::now(),
        }
    }
}

/// Totals over every cost entry of an execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    pub total_time_secs: f64,
    pub by_agent: BTreeMap<String, f64>,
}

impl CostSummary {
    pub fn from_entries(entries: &[CostEntry]) -> Self {
        let mut summary = Self::default();
        for entry in entries {
            summary.total_cost_usd += entry.cost_usd;
            summary.total_tokens += u64::from(entry.usage.total());
            summary.total_time_secs += entry.execution_time_secs;
            *summary.by_agent.entry(entry.agent.clone()).or_insert(0.0) += entry.cost_usd;
        }
        summary
    }
}

impl std::fmt::Display for CostSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "${:.4} ({} tokens, {:.1}s)",
            self.total_cost_usd, self.total_tokens, self.total_time_secs
        )
    }
}

//! Per-execution plot storage

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A stored plot. Never modified after it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotMetadata {
    pub plot_id: String,
    pub description: String,
    pub agent_name: String,
    pub created_at: DateTime<Utc>,
    pub html_content: String,
    #[serde(default)]
    pub data_summary: String,
}

/// Summary of a storage's contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageStats {
    pub execution_id: String,
    pub total_plots: usize,
    /// Plot count per agent
    pub agents: BTreeMap<String, usize>,
    pub total_html_bytes: usize,
}

/// Plot storage shared between the expert branches of one execution
pub type SharedPlotStorage = Arc<RwLock<PlotStorage>>;

/// Append-only keyed store of generated plots for one execution.
///
/// Plot ids have the form `{agent}_{unix_millis}_{sequence:03}`. The
/// sequence increases on every store, so ids stay distinct even when two
/// plots land in the same millisecond.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlotStorage {
    execution_id: String,
    plots: Vec<PlotMetadata>,
    counter: u32,
}

impl PlotStorage {
    pub fn new(execution_id: impl Into<String>) -> Self {
        let execution_id = execution_id.into();
        tracing::info!("Initialized plot storage for execution {}", execution_id);
        Self {
            execution_id,
            plots: vec![],
            counter: 0,
        }
    }

    /// Wrap in a shared handle
    pub fn shared(self) -> SharedPlotStorage {
        Arc::new(RwLock::new(self))
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    fn next_plot_id(&mut self, agent_name: &str, now: DateTime<Utc>) -> String {
        self.counter += 1;
        format!(
            "{}_{}_{:03}",
            agent_name,
            now.timestamp_millis(),
            self.counter
        )
    }

    /// Store a plot and return its new id
    pub fn store_plot(
        &mut self,
        html_content: impl Into<String>,
        description: impl Into<String>,
        agent_name: &str,
        data_summary: impl Into<String>,
    ) -> String {
        let now = Utc::now();
        let plot_id = self.next_plot_id(agent_name, now);
        self.plots.push(PlotMetadata {
            plot_id: plot_id.clone(),
            description: description.into(),
            agent_name: agent_name.to_string(),
            created_at: now,
            html_content: html_content.into(),
            data_summary: data_summary.into(),
        });
        tracing::info!("Stored plot {} from agent {}", plot_id, agent_name);
        plot_id
    }

    pub fn get_plot(&self, plot_id: &str) -> Option<&PlotMetadata> {
        self.plots.iter().find(|p| p.plot_id == plot_id)
    }

    /// Plot content, or `None` for unknown ids and plots stored without content
    pub fn get_plot_html(&self, plot_id: &str) -> Option<&str> {
        self.get_plot(plot_id)
            .map(|p| p.html_content.as_str())
            .filter(|html| !html.trim().is_empty())
    }

    pub fn contains(&self, plot_id: &str) -> bool {
        self.get_plot(plot_id).is_some()
    }

    /// All plots ordered by creation time
    pub fn list_available_plots(&self) -> Vec<&PlotMetadata> {
        let mut plots: Vec<&PlotMetadata> = self.plots.iter().collect();
        plots.sort_by_key(|p| p.created_at);
        plots
    }

    /// Plots created by one agent, ordered by creation time
    pub fn plots_by_agent(&self, agent_name: &str) -> Vec<&PlotMetadata> {
        let mut plots: Vec<&PlotMetadata> = self
            .plots
            .iter()
            .filter(|p| p.agent_name == agent_name)
            .collect();
        plots.sort_by_key(|p| p.created_at);
        plots
    }

    pub fn count_for_agent(&self, agent_name: &str) -> usize {
        self.plots
            .iter()
            .filter(|p| p.agent_name == agent_name)
            .count()
    }

    pub fn len(&self) -> usize {
        self.plots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }

    /// Drop every plot. Only used once an execution is over.
    pub fn clear_plots(&mut self) {
        let count = self.plots.len();
        self.plots.clear();
        self.counter = 0;
        tracing::info!(
            "Cleared {} plots from execution {}",
            count,
            self.execution_id
        );
    }

    pub fn storage_stats(&self) -> StorageStats {
        let mut agents = BTreeMap::new();
        for plot in &self.plots {
            *agents.entry(plot.agent_name.clone()).or_insert(0) += 1;
        }
        StorageStats {
            execution_id: self.execution_id.clone(),
            total_plots: self.plots.len(),
            agents,
            total_html_bytes: self.plots.iter().map(|p| p.html_content.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_distinct_within_one_millisecond() {
        let mut storage = PlotStorage::new("user_1");
        let now = Utc::now();
        let a = storage.next_plot_id("metrics", now);
        let b = storage.next_plot_id("metrics", now);
        assert_ne!(a, b);
        assert!(a.ends_with("_001"));
        assert!(b.ends_with("_002"));
        assert!(a.starts_with(&format!("metrics_{}_", now.timestamp_millis())));
    }

    #[test]
    fn test_store_many_unique() {
        let mut storage = PlotStorage::new("exec");
        let ids: HashSet<String> = (0..50)
            .map(|i| storage.store_plot("<div/>", format!("plot {i}"), "activity", ""))
            .collect();
        assert_eq!(ids.len(), 50);
        assert_eq!(storage.len(), 50);
    }

    #[test]
    fn test_lookup_and_counts() {
        let mut storage = PlotStorage::new("exec");
        let id = storage.store_plot("<div>hr</div>", "HR zones", "physiology", "7 days");
        storage.store_plot("<div>tss</div>", "Load", "metrics", "");

        assert_eq!(storage.get_plot_html(&id), Some("<div>hr</div>"));
        assert_eq!(storage.get_plot(&id).unwrap().data_summary, "7 days");
        assert!(storage.get_plot_html("missing").is_none());
        assert_eq!(storage.count_for_agent("physiology"), 1);
        assert_eq!(storage.plots_by_agent("metrics")[0].description, "Load");

        let stats = storage.storage_stats();
        assert_eq!(stats.total_plots, 2);
        assert_eq!(stats.agents.len(), 2);
    }

    #[test]
    fn test_plot_without_content_has_no_html() {
        let mut storage = PlotStorage::new("exec");
        let id = storage.store_plot("", "Empty", "metrics", "");
        assert!(storage.contains(&id));
        assert!(storage.get_plot_html(&id).is_none());
    }

    #[test]
    fn test_clear() {
        let mut storage = PlotStorage::new("exec");
        storage.store_plot("<div/>", "a", "metrics", "");
        storage.clear_plots();
        assert!(storage.is_empty());
    }
}

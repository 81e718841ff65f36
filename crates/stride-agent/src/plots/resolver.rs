//! `[PLOT:<id>]` reference resolution

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use super::storage::PlotStorage;

static PLOT_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[PLOT:([^\]]+)\]").expect("valid plot reference regex"));

/// Format a reference token for a plot id
pub fn plot_token(plot_id: &str) -> String {
    format!("[PLOT:{plot_id}]")
}

/// Result of checking a text's plot references against storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceValidation {
    pub total_references: usize,
    pub unique_references: usize,
    pub found_plots: BTreeSet<String>,
    pub missing_plots: BTreeSet<String>,
    pub validation_passed: bool,
}

/// Replaces plot reference tokens with embeddable markup
pub struct PlotReferenceResolver<'a> {
    storage: &'a PlotStorage,
}

impl<'a> PlotReferenceResolver<'a> {
    pub fn new(storage: &'a PlotStorage) -> Self {
        Self { storage }
    }

    /// Resolve every reference in `text`.
    ///
    /// The first reference to an id becomes its markup and later references
    /// to the same id are removed. Text without references is returned
    /// unchanged, so resolving twice is the same as resolving once.
    pub fn resolve_plot_references(&self, text: &str) -> String {
        let mut seen = HashSet::new();
        let mut total = 0usize;
        let mut embedded = 0usize;

        let resolved = PLOT_REFERENCE.replace_all(text, |caps: &regex::Captures<'_>| {
            let plot_id = &caps[1];
            total += 1;
            if !seen.insert(plot_id.to_string()) {
                tracing::debug!("Removing duplicate reference to plot {}", plot_id);
                return String::new();
            }
            if self.storage.get_plot_html(plot_id).is_some() {
                embedded += 1;
            }
            self.embed_plot(plot_id)
        });

        if total > 0 {
            tracing::info!(
                "Resolved {}/{} plot references ({} unique)",
                embedded,
                total,
                seen.len()
            );
        }
        resolved.into_owned()
    }

    fn embed_plot(&self, plot_id: &str) -> String {
        if let Some(html) = self.storage.get_plot_html(plot_id) {
            return wrap_plot_html(plot_id, html);
        }

        tracing::warn!("Plot {} not found, using fallback", plot_id);
        match self.storage.get_plot(plot_id) {
            Some(plot) => format!(
                concat!(
                    "<div class=\"plot-fallback\">",
                    "<p><strong>Plot Unavailable: {}</strong></p>",
                    "<p><em>Created by {}</em></p>",
                    "<p>Plot ID: {}</p>",
                    "</div>"
                ),
                plot.description, plot.agent_name, plot_id
            ),
            None => format!(
                concat!(
                    "<div class=\"plot-error\">",
                    "<p><strong>Plot Not Found</strong></p>",
                    "<p>Plot ID: {}</p>",
                    "</div>"
                ),
                plot_id
            ),
        }
    }

    /// Referenced ids in order of appearance, repeats included
    pub fn extract_plot_references(&self, text: &str) -> Vec<String> {
        extract_plot_references(text)
    }

    pub fn validate_plot_references(&self, text: &str) -> ReferenceValidation {
        let references = extract_plot_references(text);
        let unique: BTreeSet<String> = references.iter().cloned().collect();
        let (found_plots, missing_plots): (BTreeSet<String>, BTreeSet<String>) = unique
            .iter()
            .cloned()
            .partition(|id| self.storage.contains(id));

        ReferenceValidation {
            total_references: references.len(),
            unique_references: unique.len(),
            validation_passed: missing_plots.is_empty(),
            found_plots,
            missing_plots,
        }
    }

    /// Human-readable list of the stored plots
    pub fn plot_summary(&self) -> String {
        let plots = self.storage.list_available_plots();
        if plots.is_empty() {
            return "No plots available".to_string();
        }

        let mut lines = vec![format!("Available plots ({}):", plots.len())];
        lines.extend(
            plots
                .iter()
                .map(|p| format!("  - {}: {} (by {})", p.plot_id, p.description, p.agent_name)),
        );
        lines.join("\n")
    }
}

/// Referenced ids in order of appearance, repeats included
pub fn extract_plot_references(text: &str) -> Vec<String> {
    PLOT_REFERENCE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

fn wrap_plot_html(plot_id: &str, html: &str) -> String {
    format!(
        "<div class=\"plot-container\" id=\"plot-{plot_id}\">\
         <div class=\"plot-content\">{html}</div></div>"
    )
}

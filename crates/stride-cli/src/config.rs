//! Configuration file support

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use stride_agent::AgentRole;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Configuration for stride
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Anthropic model id
    pub model: Option<String>,
    /// Output token cap per model call
    pub max_tokens: Option<u32>,
    /// API key (alternative to `ANTHROPIC_API_KEY`)
    pub api_key: Option<String>,
    /// Plots each expert may create
    pub max_plots: Option<u32>,
    /// Reject over-limit tool calls instead of only warning
    pub strict_limits: Option<bool>,
    /// Give experts the plotting tools by default
    pub plotting: Option<bool>,
    /// Python interpreter for plotting code
    pub python: Option<String>,
    pub executor_timeout_secs: Option<u64>,
    /// Where in-flight runs are checkpointed
    pub checkpoint_dir: Option<PathBuf>,
    /// Where finished reports are written
    pub storage_dir: Option<PathBuf>,
    /// Model calls each expert may make
    pub max_iterations: Option<u32>,
    /// Run the season and weekly planners after the analysis
    pub planning: Option<bool>,
    /// Model id per role, e.g. `season_planner = "claude-opus-4-1"`
    pub role_models: BTreeMap<String, String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stride")
    }

    fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stride")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("STRIDE_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file, falling back to defaults on any problem
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            model: Some(DEFAULT_MODEL.to_string()),
            max_plots: Some(stride_agent::limiter::DEFAULT_MAX_PLOTS),
            strict_limits: Some(true),
            plotting: Some(false),
            python: Some("python3".to_string()),
            executor_timeout_secs: Some(6),
            ..Default::default()
        };

        default_config.save()?;
        Ok(path)
    }

    pub fn model_id(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// API key from config, then the environment
    pub fn api_key(&self) -> Option<String> {
        stride_ai::providers::get_api_key(self.api_key.as_deref(), "ANTHROPIC_API_KEY").ok()
    }

    pub fn python(&self) -> &str {
        self.python.as_deref().unwrap_or("python3")
    }

    pub fn executor_timeout(&self) -> Duration {
        self.executor_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(stride_agent::executor::DEFAULT_TIMEOUT)
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.checkpoint_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("checkpoints"))
    }

    /// Role overrides with a known role; others are skipped with a warning
    pub fn role_model_ids(&self) -> Vec<(AgentRole, &str)> {
        self.role_models
            .iter()
            .filter_map(|(role, id)| match role.parse::<AgentRole>() {
                Ok(role) => Some((role, id.as_str())),
                Err(e) => {
                    tracing::warn!("Ignoring role_models entry: {}", e);
                    None
                }
            })
            .collect()
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("plans"))
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# stride configuration file
# Place at ~/.config/stride/config.toml or point STRIDE_CONFIG_PATH at it

# Anthropic model used by every expert
model = "claude-sonnet-4-5-20250929"
# max_tokens = 8192

# Plotting (off unless --plotting is given or this is true)
plotting = false
max_plots = 2
strict_limits = true
python = "python3"
executor_timeout_secs = 6

# Model calls per expert before it is stopped
# max_iterations = 15

# Season and weekly planning after the analysis (or pass --planning)
planning = false

# checkpoint_dir = "~/.local/share/stride/checkpoints"
# storage_dir = "~/.local/share/stride/plans"

# Prefer the ANTHROPIC_API_KEY environment variable
# api_key = "sk-ant-..."

# Per-role model overrides
[role_models]
season_planner = "claude-opus-4-1-20250805"
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let config = Config::parse(example_config()).unwrap();
        assert_eq!(config.model_id(), DEFAULT_MODEL);
        assert_eq!(config.max_plots, Some(2));
        assert_eq!(config.executor_timeout(), Duration::from_secs(6));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = Config::parse("plotting = true").unwrap();
        assert_eq!(config.plotting, Some(true));
        assert_eq!(config.python(), "python3");
        assert_eq!(config.model_id(), DEFAULT_MODEL);
        assert!(config.checkpoint_dir().ends_with("checkpoints"));
    }

    #[test]
    fn test_role_models() {
        let config = Config::parse(
            "[role_models]\nweekly_planner = \"claude-opus-4-1\"\ncoach = \"x\"",
        )
        .unwrap();
        assert_eq!(
            config.role_model_ids(),
            vec![(AgentRole::WeeklyPlanner, "claude-opus-4-1")]
        );

        let example = Config::parse(example_config()).unwrap();
        assert_eq!(example.role_model_ids()[0].0, AgentRole::SeasonPlanner);
    }

    #[test]
    fn test_bad_types_are_rejected() {
        assert!(Config::parse("max_plots = \"two\"").is_err());
    }
}

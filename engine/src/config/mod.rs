//! Configuration management
//!
//! This module handles loading, validation, and management of the Trellis
//! configuration. Configuration is stored in TOML format at
//! ~/.trellis/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory, log level
//! - **llm**: Chat-completions endpoint, model, API key env var
//! - **workflow**: Per-step timeout, classifier history window
//! - **pruning**: Per-consumer context pruning rule table
//!
//! The pruning rule table lives here, not in the pruner: strategies are
//! injected at construction so deployments and tests can swap them without
//! code changes.

use crate::workflow::pruner::PruningStrategy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Workflow execution settings
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Context pruning rule table
    #[serde(default)]
    pub pruning: PruningSettings,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// LLM provider configuration
///
/// The engine speaks the OpenAI-compatible chat-completions wire format, so
/// `base_url` can point at a hosted API or a local server (e.g. Ollama's
/// /v1 endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the chat-completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable holding the API key.
    /// Local servers typically need none; the header is omitted when the
    /// variable is unset.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Timeout for each provider call in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Workflow execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Per-step timeout in seconds. A step that exceeds it degrades to an
    /// error-tagged response instead of stalling the plan.
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,

    /// How many recent messages the intent classifier sees
    #[serde(default = "default_classifier_window")]
    pub classifier_window: usize,
}

/// Context pruning rule table: consumer name -> strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruningSettings {
    /// Fallback recency window for consumers with no configured rule
    #[serde(default = "default_pruning_window")]
    pub default_window: usize,

    /// Per-consumer strategy overrides
    #[serde(default = "default_pruning_rules")]
    pub rules: HashMap<String, PruningStrategy>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.trellis")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_api_key_env() -> String {
    "TRELLIS_API_KEY".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_step_timeout() -> u64 {
    60
}

fn default_classifier_window() -> usize {
    10
}

fn default_pruning_window() -> usize {
    20
}

fn default_pruning_rules() -> HashMap<String, PruningStrategy> {
    let mut rules = HashMap::new();
    rules.insert("conversation".to_string(), PruningStrategy::Recency { window: 30 });
    rules.insert("recorder".to_string(), PruningStrategy::DecisionsOnly);
    rules.insert("gap_analysis".to_string(), PruningStrategy::TasksOnly);
    rules.insert("review".to_string(), PruningStrategy::DecisionsOnly);
    rules.insert("research".to_string(), PruningStrategy::Recency { window: 10 });
    rules.insert("reference".to_string(), PruningStrategy::Recency { window: 10 });
    rules
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout(),
            classifier_window: default_classifier_window(),
        }
    }
}

impl Default for PruningSettings {
    fn default() -> Self {
        Self {
            default_window: default_pruning_window(),
            rules: default_pruning_rules(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            llm: LlmConfig::default(),
            workflow: WorkflowConfig::default(),
            pruning: PruningSettings::default(),
        }
    }
}

impl Config {
    /// Default config file location: ~/.trellis/config.toml
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Cannot determine home directory")?;
        Ok(home.join(".trellis").join("config.toml"))
    }

    /// Load the configuration from the default location, creating it with
    /// defaults if it does not exist yet.
    pub fn load_or_create() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            let config = Self::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
            let rendered =
                toml::to_string_pretty(&config).context("Failed to serialize default config")?;
            fs::write(&path, rendered).context("Failed to write default config")?;
            tracing::info!("Created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Load the configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the data directory, expanding a leading `~/`
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.core.data_dir)
    }

    /// Path of the SQLite database file inside the data directory
    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("trellis.db")
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.workflow.step_timeout_secs, 60);
        assert_eq!(config.pruning.default_window, 20);
        assert!(config.pruning.rules.contains_key("conversation"));
        assert_eq!(
            config.pruning.rules.get("recorder"),
            Some(&PruningStrategy::DecisionsOnly)
        );
    }

    #[test]
    fn test_parse_partial_config() {
        // Missing sections fall back to defaults
        let raw = r#"
            [core]
            log_level = "debug"

            [llm]
            base_url = "https://api.example.com/v1"
            model = "test-model"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.core.log_level, "debug");
        assert_eq!(config.llm.model, "test-model");
        assert_eq!(config.workflow.step_timeout_secs, 60);
        assert!(!config.pruning.rules.is_empty());
    }

    #[test]
    fn test_pruning_rules_from_toml() {
        let raw = r#"
            [pruning]
            default_window = 15

            [pruning.rules]
            conversation = { strategy = "recency", window = 5 }
            recorder = { strategy = "decisions_only" }
            gap_analysis = { strategy = "tasks_only" }
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.pruning.default_window, 15);
        assert_eq!(
            config.pruning.rules.get("conversation"),
            Some(&PruningStrategy::Recency { window: 5 })
        );
        assert_eq!(
            config.pruning.rules.get("gap_analysis"),
            Some(&PruningStrategy::TasksOnly)
        );
    }

    #[test]
    fn test_roundtrip() {
        let config = Config::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(back.llm.base_url, config.llm.base_url);
        assert_eq!(back.pruning.rules.len(), config.pruning.rules.len());
    }

    #[test]
    fn test_expand_home() {
        let expanded = expand_home(Path::new("~/.trellis"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join(".trellis"));
        }
        // Absolute paths pass through untouched
        assert_eq!(
            expand_home(Path::new("/var/lib/trellis")),
            PathBuf::from("/var/lib/trellis")
        );
    }
}

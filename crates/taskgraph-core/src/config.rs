use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TaskgraphError};

/// Top-level taskgraph configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub model: Option<ModelConfig>,
    #[serde(default)]
    pub http: HttpConfig,
    /// Values handed verbatim to integration handlers.
    /// Workflow-level globals override keys set here.
    #[serde(default)]
    pub globals: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base directory for relative paths in file steps.
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    /// Maximum characters of a step result shown in the summary.
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
    /// Capacity of the workflow event bus.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            summary_max_chars: default_summary_max_chars(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_working_dir() -> String { ".".to_string() }
fn default_summary_max_chars() -> usize { 200 }
fn default_event_capacity() -> usize { 256 }

/// Model backing the CLI's agents (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Connect timeout for outbound integration calls.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_connect_timeout() -> u64 { 10 }
fn default_user_agent() -> String { format!("taskgraph/{}", env!("CARGO_PKG_VERSION")) }

impl AppConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| TaskgraphError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config = toml::from_str(&expanded)
            .map_err(|e| TaskgraphError::Config(e.to_string()))?;
        debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Resolve the working directory (expand ~).
    pub fn working_dir(&self) -> PathBuf {
        let wd = &self.engine.working_dir;
        if let Some(rest) = wd.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(wd)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
pub fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

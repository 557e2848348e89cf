use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use taskgraph_core::config::expand_env_vars;
use taskgraph_core::error::{Result, TaskgraphError};

use crate::step::{Step, StepDefinition};

#[derive(Deserialize)]
struct RawWorkflow {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    steps: Vec<StepDefinition>,
    #[serde(default)]
    globals: HashMap<String, Value>,
}

/// A validated workflow: ordered steps plus global integration settings.
///
/// The first step is the entry point of every run.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<Step>,
    pub globals: HashMap<String, Value>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: None,
            steps,
            globals: HashMap::new(),
        }
    }

    pub fn with_globals(mut self, globals: HashMap<String, Value>) -> Self {
        self.globals = globals;
        self
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        let raw: RawWorkflow = serde_json::from_str(input)?;
        Self::from_raw(raw)
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        let raw: RawWorkflow =
            toml::from_str(input).map_err(|e| TaskgraphError::Config(e.to_string()))?;
        Self::from_raw(raw)
    }

    /// Load a definition file, expanding `${ENV_VAR}` references first.
    ///
    /// `.toml` files are parsed as TOML, anything else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TaskgraphError::ConfigNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let expanded = expand_env_vars(&content);

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let definition = if is_toml {
            Self::from_toml_str(&expanded)?
        } else {
            Self::from_json_str(&expanded)?
        };
        debug!(
            path = %path.display(),
            steps = definition.steps.len(),
            "Loaded workflow definition"
        );
        Ok(definition)
    }

    fn from_raw(raw: RawWorkflow) -> Result<Self> {
        let steps = raw
            .steps
            .into_iter()
            .map(Step::try_from)
            .collect::<Result<Vec<_>>>()?;
        let definition = Self {
            name: raw.name,
            description: raw.description,
            steps,
            globals: raw.globals,
        };
        definition.validate()?;
        Ok(definition)
    }

    /// Reject duplicate step ids.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(TaskgraphError::DuplicateStepId(step.id.clone()));
            }
        }
        Ok(())
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// `(step id, missing next-step id)` pairs.
    pub fn unknown_references(&self) -> Vec<(String, String)> {
        let known: HashSet<&str> = self.steps.iter().map(|s| s.id.as_str()).collect();
        self.steps
            .iter()
            .flat_map(|step| {
                step.next_steps
                    .iter()
                    .filter(|next| !known.contains(next.as_str()))
                    .map(|next| (step.id.clone(), next.clone()))
            })
            .collect()
    }

    /// Steps no path of next-step links reaches from the entry step,
    /// ignoring entry conditions.
    pub fn unreachable_steps(&self) -> Vec<String> {
        let Some(entry) = self.steps.first() else {
            return vec![];
        };

        let mut reached: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([entry.id.as_str()]);
        while let Some(id) = queue.pop_front() {
            if !reached.insert(id) {
                continue;
            }
            if let Some(step) = self.step(id) {
                queue.extend(step.next_steps.iter().map(String::as_str));
            }
        }

        self.steps
            .iter()
            .filter(|s| !reached.contains(s.id.as_str()))
            .map(|s| s.id.clone())
            .collect()
    }
}

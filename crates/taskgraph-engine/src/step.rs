use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use taskgraph_core::error::{Result, TaskgraphError};
use taskgraph_core::types::{AgentSpec, StepStatus, TeamSpec};

use crate::condition::Condition;
use crate::external::ExternalConfig;

/// Kind of work a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Agent,
    Team,
    Condition,
    External,
    Parallel,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Team => "team",
            Self::Condition => "condition",
            Self::External => "external",
            Self::Parallel => "parallel",
        }
    }
}

impl std::str::FromStr for StepType {
    type Err = TaskgraphError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Self::Agent),
            "team" => Ok(Self::Team),
            "condition" => Ok(Self::Condition),
            "external" => Ok(Self::External),
            "parallel" => Ok(Self::Parallel),
            other => Err(TaskgraphError::UnsupportedStepType(other.to_string())),
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentStepConfig {
    /// Task text handed to the agent.
    pub task: String,
    /// Context fields prepended to the task before it is sent.
    #[serde(default)]
    pub input_keys: Vec<String>,
    #[serde(flatten)]
    pub agent: AgentSpec,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TeamStepConfig {
    pub task: String,
    #[serde(default)]
    pub input_keys: Vec<String>,
    #[serde(flatten)]
    pub team: TeamSpec,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConditionStepConfig {
    pub condition: Condition,
}

/// One sub-task of a parallel step.
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelTask {
    pub name: String,
    pub kind: TaskKind,
}

/// Work a parallel sub-task may perform.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskKind {
    Agent(AgentStepConfig),
    Team(TeamStepConfig),
    External(ExternalConfig),
}

impl ParallelTask {
    pub fn agent(name: impl Into<String>, task: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: TaskKind::Agent(AgentStepConfig {
                task: task.into(),
                input_keys: vec![],
                agent: AgentSpec::new(name.clone()),
            }),
            name,
        }
    }

    pub fn team(name: impl Into<String>, task: impl Into<String>, team: TeamSpec) -> Self {
        Self {
            name: name.into(),
            kind: TaskKind::Team(TeamStepConfig {
                task: task.into(),
                input_keys: vec![],
                team,
            }),
        }
    }

    pub fn external(name: impl Into<String>, config: ExternalConfig) -> Self {
        Self {
            name: name.into(),
            kind: TaskKind::External(config),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParallelConfig {
    pub tasks: Vec<ParallelTask>,
}

/// Typed step configuration, validated when the step is built.
#[derive(Debug, Clone, PartialEq)]
pub enum StepConfig {
    Agent(AgentStepConfig),
    Team(TeamStepConfig),
    Condition(ConditionStepConfig),
    External(ExternalConfig),
    Parallel(ParallelConfig),
}

impl StepConfig {
    pub fn step_type(&self) -> StepType {
        match self {
            Self::Agent(_) => StepType::Agent,
            Self::Team(_) => StepType::Team,
            Self::Condition(_) => StepType::Condition,
            Self::External(_) => StepType::External,
            Self::Parallel(_) => StepType::Parallel,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorPolicy {
    /// Record a failure as the step's result instead of aborting the run.
    #[serde(default)]
    pub continue_on_error: bool,
}

/// A step as written in a workflow definition, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct StepDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default, alias = "conditions")]
    pub entry_conditions: Vec<Condition>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default, alias = "error_handling")]
    pub error_policy: ErrorPolicy,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub retry_count: u32,
}

/// One unit of work in a workflow graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Unique within a workflow.
    pub id: String,
    pub name: String,
    pub config: StepConfig,
    /// Gate deciding whether the step runs at all.
    pub entry_conditions: Vec<Condition>,
    /// Candidate successors, in order. May name unknown ids.
    pub next_steps: Vec<String>,
    pub error_policy: ErrorPolicy,
    /// Carried for forward compatibility; the engine does not enforce it.
    pub timeout_seconds: Option<u64>,
    /// Carried for forward compatibility; the engine does not retry.
    pub retry_count: u32,
}

impl Step {
    pub fn new(id: impl Into<String>, name: impl Into<String>, config: StepConfig) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            config,
            entry_conditions: vec![],
            next_steps: vec![],
            error_policy: ErrorPolicy::default(),
            timeout_seconds: None,
            retry_count: 0,
        }
    }

    /// An agent step whose agent shares the step's name.
    pub fn agent(id: impl Into<String>, name: impl Into<String>, task: impl Into<String>) -> Self {
        let name = name.into();
        let config = StepConfig::Agent(AgentStepConfig {
            task: task.into(),
            input_keys: vec![],
            agent: AgentSpec::new(name.clone()),
        });
        Self::new(id, name, config)
    }

    pub fn team(
        id: impl Into<String>,
        name: impl Into<String>,
        task: impl Into<String>,
        mut team: TeamSpec,
    ) -> Self {
        let name = name.into();
        if team.name.is_empty() {
            team.name = name.clone();
        }
        let config = StepConfig::Team(TeamStepConfig {
            task: task.into(),
            input_keys: vec![],
            team,
        });
        Self::new(id, name, config)
    }

    pub fn condition(id: impl Into<String>, name: impl Into<String>, condition: Condition) -> Self {
        Self::new(id, name, StepConfig::Condition(ConditionStepConfig { condition }))
    }

    pub fn external(
        id: impl Into<String>,
        name: impl Into<String>,
        config: ExternalConfig,
    ) -> Self {
        Self::new(id, name, StepConfig::External(config))
    }

    pub fn parallel(
        id: impl Into<String>,
        name: impl Into<String>,
        tasks: Vec<ParallelTask>,
    ) -> Self {
        Self::new(id, name, StepConfig::Parallel(ParallelConfig { tasks }))
    }

    /// Set the candidate successors.
    pub fn with_next<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next_steps = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Set the entry conditions.
    pub fn with_entry_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.entry_conditions = conditions;
        self
    }

    /// Absorb failures of this step instead of aborting the run.
    pub fn continue_on_error(mut self) -> Self {
        self.error_policy.continue_on_error = true;
        self
    }

    /// Set the context fields prepended to an agent or team task.
    pub fn with_inputs(mut self, keys: Vec<String>) -> Self {
        match &mut self.config {
            StepConfig::Agent(c) => c.input_keys = keys,
            StepConfig::Team(c) => c.input_keys = keys,
            _ => {}
        }
        self
    }

    pub fn step_type(&self) -> StepType {
        self.config.step_type()
    }

    /// Parse and validate a single step from its JSON definition.
    pub fn from_value(value: Value) -> Result<Self> {
        let definition: StepDefinition = serde_json::from_value(value)?;
        Self::try_from(definition)
    }
}

impl TryFrom<StepDefinition> for Step {
    type Error = TaskgraphError;

    fn try_from(def: StepDefinition) -> Result<Self> {
        let step_type: StepType = def.step_type.parse()?;
        let name = def.name.unwrap_or_else(|| def.id.clone());
        let config = parse_config(&def.id, &name, step_type, def.config)?;

        Ok(Self {
            id: def.id,
            name,
            config,
            entry_conditions: def.entry_conditions,
            next_steps: def.next_steps,
            error_policy: def.error_policy,
            timeout_seconds: def.timeout_seconds,
            retry_count: def.retry_count,
        })
    }
}

#[derive(Deserialize)]
struct RawParallel {
    tasks: Vec<RawTask>,
}

#[derive(Deserialize)]
struct RawTask {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    task_type: String,
    #[serde(default)]
    config: Value,
}

fn parse_config(
    step_id: &str,
    name: &str,
    step_type: StepType,
    config: Value,
) -> Result<StepConfig> {
    let invalid = |e: serde_json::Error| TaskgraphError::InvalidStepConfig {
        step: step_id.to_string(),
        message: e.to_string(),
    };

    Ok(match step_type {
        StepType::Agent => StepConfig::Agent(parse_agent(config, name).map_err(invalid)?),
        StepType::Team => StepConfig::Team(parse_team(config, name).map_err(invalid)?),
        StepType::Condition => {
            StepConfig::Condition(serde_json::from_value(config).map_err(invalid)?)
        }
        StepType::External => StepConfig::External(ExternalConfig::from_value(step_id, config)?),
        StepType::Parallel => {
            let raw: RawParallel = serde_json::from_value(config).map_err(invalid)?;
            let mut tasks = Vec::with_capacity(raw.tasks.len());
            for (index, task) in raw.tasks.into_iter().enumerate() {
                let task_name = task.name.unwrap_or_else(|| format!("task_{}", index));
                let kind = match task.task_type.as_str() {
                    "agent" => {
                        TaskKind::Agent(parse_agent(task.config, &task_name).map_err(invalid)?)
                    }
                    "team" => TaskKind::Team(parse_team(task.config, &task_name).map_err(invalid)?),
                    "external" => TaskKind::External(ExternalConfig::from_value(
                        &format!("{}_{}", step_id, task_name),
                        task.config,
                    )?),
                    other => {
                        return Err(TaskgraphError::InvalidStepConfig {
                            step: step_id.to_string(),
                            message: format!("parallel task type '{}' is not supported", other),
                        })
                    }
                };
                tasks.push(ParallelTask {
                    name: task_name,
                    kind,
                });
            }
            StepConfig::Parallel(ParallelConfig { tasks })
        }
    })
}

fn parse_agent(config: Value, default_name: &str) -> serde_json::Result<AgentStepConfig> {
    let mut agent: AgentStepConfig = serde_json::from_value(config)?;
    if agent.agent.name.is_empty() {
        agent.agent.name = default_name.to_string();
    }
    Ok(agent)
}

fn parse_team(config: Value, default_name: &str) -> serde_json::Result<TeamStepConfig> {
    let mut team: TeamStepConfig = serde_json::from_value(config)?;
    if team.team.name.is_empty() {
        team.team.name = default_name.to_string();
    }
    Ok(team)
}

/// Runtime state of a step within one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepState {
    pub status: StepStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl StepState {
    pub fn start(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self, result: Value) {
        self.status = StepStatus::Completed;
        self.result = Some(result);
        self.ended_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error = Some(error.into());
        self.ended_at = Some(Utc::now());
    }

    pub fn elapsed_ms(&self) -> u64 {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as u64,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionKind;
    use serde_json::json;
    use taskgraph_core::types::TeamMode;

    #[test]
    fn test_step_builder() {
        let step = Step::agent("a", "Analyze", "Analyze the request")
            .with_next(["b", "c"])
            .with_entry_conditions(vec![Condition::exists("input")])
            .continue_on_error();

        assert_eq!(step.id, "a");
        assert_eq!(step.step_type(), StepType::Agent);
        assert_eq!(step.next_steps, vec!["b", "c"]);
        assert_eq!(step.entry_conditions.len(), 1);
        assert!(step.error_policy.continue_on_error);
        match &step.config {
            StepConfig::Agent(c) => {
                assert_eq!(c.agent.name, "Analyze");
                assert_eq!(c.task, "Analyze the request");
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }

    #[test]
    fn test_parse_agent_definition() {
        let step = Step::from_value(json!({
            "id": "research",
            "name": "Research",
            "type": "agent",
            "config": {
                "task": "Find sources",
                "instructions": "You are a researcher.",
                "input_keys": ["topic"]
            },
            "conditions": [{"type": "exists", "field": "topic"}],
            "next_steps": ["write"],
            "error_handling": {"continue_on_error": true},
            "timeout_seconds": 60,
            "retry_count": 2
        }))
        .unwrap();

        assert_eq!(step.name, "Research");
        assert_eq!(step.entry_conditions[0].kind, ConditionKind::Exists);
        assert!(step.error_policy.continue_on_error);
        assert_eq!(step.timeout_seconds, Some(60));
        assert_eq!(step.retry_count, 2);
        match step.config {
            StepConfig::Agent(c) => {
                assert_eq!(c.agent.name, "Research");
                assert_eq!(c.agent.instructions.as_deref(), Some("You are a researcher."));
                assert_eq!(c.input_keys, vec!["topic"]);
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }

    #[test]
    fn test_name_defaults_to_id() {
        let step = Step::from_value(json!({
            "id": "summarize",
            "type": "agent",
            "config": {"task": "Summarize"}
        }))
        .unwrap();
        assert_eq!(step.name, "summarize");
        assert!(!step.error_policy.continue_on_error);
    }

    #[test]
    fn test_parse_team_definition() {
        let step = Step::from_value(json!({
            "id": "review",
            "type": "team",
            "config": {
                "task": "Review the draft",
                "mode": "collaborate",
                "members": [{"name": "editor"}, {"name": "checker"}]
            }
        }))
        .unwrap();
        match step.config {
            StepConfig::Team(c) => {
                assert_eq!(c.team.name, "review");
                assert_eq!(c.team.mode, TeamMode::Collaborate);
                assert_eq!(c.team.members.len(), 2);
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }

    #[test]
    fn test_parse_parallel_definition() {
        let step = Step::from_value(json!({
            "id": "fan",
            "type": "parallel",
            "config": {
                "tasks": [
                    {"name": "a", "type": "agent", "config": {"task": "one"}},
                    {"type": "external", "config": {"integration_type": "database", "query": "SELECT 1"}}
                ]
            }
        }))
        .unwrap();
        match step.config {
            StepConfig::Parallel(p) => {
                assert_eq!(p.tasks.len(), 2);
                assert_eq!(p.tasks[0].name, "a");
                assert!(matches!(&p.tasks[0].kind, TaskKind::Agent(c) if c.agent.name == "a"));
                assert_eq!(p.tasks[1].name, "task_1");
                assert!(matches!(p.tasks[1].kind, TaskKind::External(ExternalConfig::Database(_))));
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }

    #[test]
    fn test_parallel_rejects_nested_parallel() {
        let err = Step::from_value(json!({
            "id": "fan",
            "type": "parallel",
            "config": {"tasks": [{"type": "parallel", "config": {}}]}
        }))
        .unwrap_err();
        assert!(matches!(err, TaskgraphError::InvalidStepConfig { .. }));
    }

    #[test]
    fn test_unknown_step_type() {
        let err = Step::from_value(json!({"id": "x", "type": "loop"})).unwrap_err();
        assert!(matches!(err, TaskgraphError::UnsupportedStepType(t) if t == "loop"));
    }

    #[test]
    fn test_missing_task_is_invalid() {
        let err = Step::from_value(json!({"id": "x", "type": "agent", "config": {}})).unwrap_err();
        assert!(matches!(err, TaskgraphError::InvalidStepConfig { ref step, .. } if step == "x"));
    }

    #[test]
    fn test_state_transitions() {
        let mut state = StepState::default();
        assert_eq!(state.status, StepStatus::Pending);

        state.start();
        assert_eq!(state.status, StepStatus::Running);
        assert!(state.started_at.is_some());

        state.complete(json!("done"));
        assert_eq!(state.status, StepStatus::Completed);
        assert_eq!(state.result, Some(json!("done")));
        assert!(state.ended_at.is_some());

        let mut failed = StepState::default();
        failed.start();
        failed.fail("boom");
        assert_eq!(failed.status, StepStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }
}

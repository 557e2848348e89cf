use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one invocation of a workflow.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Overall run state of a workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
    Cancelled,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further transitions happen for this run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-step execution state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// Output of an agent or team invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityOutput {
    pub content: String,
}

impl CapabilityOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Describes an agent for the capability factory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Display name; defaults to the owning step's name.
    #[serde(default)]
    pub name: String,
    /// Standing instructions (system prompt) for the agent.
    #[serde(default)]
    pub instructions: Option<String>,
    /// Optional model override.
    #[serde(default)]
    pub model: Option<String>,
    /// Domain specializations used when a team routes work.
    #[serde(default)]
    pub specializations: Vec<String>,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_specializations(mut self, specs: Vec<String>) -> Self {
        self.specializations = specs;
        self
    }
}

/// Collaboration mode of a team.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamMode {
    /// Hand the task to the best-matching member.
    Route,
    /// Chain members: each sees the previous member's output.
    #[default]
    Coordinate,
    /// Every member works the task concurrently; outputs are joined.
    Collaborate,
}

impl std::fmt::Display for TeamMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Route => "route",
            Self::Coordinate => "coordinate",
            Self::Collaborate => "collaborate",
        })
    }
}

/// Describes a team of agents for the capability factory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mode: TeamMode,
    #[serde(default)]
    pub members: Vec<AgentSpec>,
}

/// HTTP methods accepted by the http integration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = crate::error::TaskgraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            other => Err(crate::error::TaskgraphError::UnsupportedOperation(format!(
                "HTTP method {}",
                other
            ))),
        }
    }
}

/// A fully resolved outbound HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout_secs: u64,
}

/// Raw response handed back by an `HttpClient`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Workflow lifecycle event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// A run started.
    RunStarted { run_id: RunId, workflow: String },
    /// A step was dispatched.
    StepStarted {
        run_id: RunId,
        step_id: String,
        step_type: String,
    },
    /// A step finished successfully.
    StepCompleted {
        run_id: RunId,
        step_id: String,
        elapsed_ms: u64,
    },
    /// A step failed. `continued` is set when the failure was absorbed.
    StepFailed {
        run_id: RunId,
        step_id: String,
        error: String,
        continued: bool,
    },
    /// A step's entry conditions did not hold.
    StepSkipped { run_id: RunId, step_id: String },
    /// The traversal drained its queue.
    RunCompleted { run_id: RunId, elapsed_ms: u64 },
    /// A step failure aborted the run.
    RunFailed { run_id: RunId, error: String },
    /// The run stopped at a step boundary after `cancel()`.
    RunCancelled { run_id: RunId },
}

/// RFC 3339 timestamp for result payloads.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use taskgraph_core::types::{RunId, WorkflowStatus};

use crate::condition::Context;
use crate::handle::WorkflowHandle;

/// Run-scoped state shared between steps.
///
/// Holds every recorded step result (keyed by step id) and the session state
/// seeded from the caller's initial parameters. The runner is the only
/// writer; handlers get read access.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    run_id: RunId,
    results: HashMap<String, Value>,
    session_state: HashMap<String, Value>,
    handle: WorkflowHandle,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl ExecutionContext {
    pub fn new(handle: WorkflowHandle) -> Self {
        Self {
            run_id: RunId::new(),
            results: HashMap::new(),
            session_state: HashMap::new(),
            handle,
            started_at: None,
            ended_at: None,
        }
    }

    /// Seed session state from initial parameters.
    pub fn seed(&mut self, params: HashMap<String, Value>) {
        self.session_state.extend(params);
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn status(&self) -> WorkflowStatus {
        self.handle.status()
    }

    /// Record a step's result.
    pub fn record(&mut self, step_id: impl Into<String>, result: Value) {
        self.results.insert(step_id.into(), result);
    }

    pub fn result(&self, step_id: &str) -> Option<&Value> {
        self.results.get(step_id)
    }

    pub fn results(&self) -> &HashMap<String, Value> {
        &self.results
    }

    pub fn session_state(&self) -> &HashMap<String, Value> {
        &self.session_state
    }

    /// Session-state keys in sorted order.
    pub fn session_state_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.session_state.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Flat view used for entry conditions.
    ///
    /// Session state overrides a step result with the same key, and
    /// `workflow_status` overrides both.
    pub fn condition_context(&self) -> Context {
        let mut ctx: Context = self.results.clone();
        ctx.extend(self.session_state.clone());
        ctx.insert(
            "workflow_status".into(),
            Value::String(self.status().as_str().to_string()),
        );
        ctx
    }

    /// Snapshot handed to a condition step.
    pub fn snapshot_for(&self, step_id: &str) -> Context {
        let mut ctx = self.condition_context();
        ctx.insert("current_step_id".into(), Value::String(step_id.to_string()));
        ctx
    }

    /// Prefix a task with the context values named by `input_keys`.
    pub fn render_task(&self, task: &str, input_keys: &[String]) -> String {
        if input_keys.is_empty() {
            return task.to_string();
        }

        let ctx = self.condition_context();
        let mut prompt = String::from("## Context Data\n\n");
        for key in input_keys {
            if let Some(value) = ctx.get(key) {
                let display = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                prompt.push_str(&format!("**{}**: {}\n", key, display));
            }
        }
        prompt.push_str("\n---\n\n");
        prompt.push_str(task);
        prompt
    }

    pub(crate) fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.ended_at = None;
    }

    pub(crate) fn finish(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Wall time of the run so far, or of the whole run once it ended.
    pub fn elapsed_ms(&self) -> u64 {
        match self.started_at {
            Some(start) => {
                let end = self.ended_at.unwrap_or_else(Utc::now);
                (end - start).num_milliseconds().max(0) as u64
            }
            None => 0,
        }
    }
}

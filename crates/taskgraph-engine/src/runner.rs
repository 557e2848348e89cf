use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use taskgraph_core::error::{Result, TaskgraphError};
use taskgraph_core::event::EventBus;
use taskgraph_core::traits::CapabilityFactory;
use taskgraph_core::types::{StepStatus, WorkflowEvent, WorkflowStatus};
use taskgraph_integrations::Integrations;

use crate::condition::evaluate;
use crate::context::ExecutionContext;
use crate::definition::WorkflowDefinition;
use crate::dispatcher::StepDispatcher;
use crate::external::Globals;
use crate::handle::WorkflowHandle;
use crate::step::{Step, StepState};
use crate::summary::{build_summary, SummaryInput};

/// Per-status step counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Point-in-time view of a runner.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatusReport {
    pub workflow: String,
    pub status: WorkflowStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub step_counts: StepCounts,
    pub execution_results_count: usize,
    pub session_state_keys: Vec<String>,
}

/// Runs a workflow definition.
///
/// Traversal is sequential and breadth-first from the first declared step:
/// a step runs at most once per run, a step whose entry conditions fail is
/// skipped along with its successors, and a failure without
/// `continue_on_error` aborts the run.
pub struct WorkflowRunner {
    name: String,
    steps: Vec<Step>,
    index: HashMap<String, usize>,
    states: Vec<StepState>,
    dispatcher: StepDispatcher,
    context: ExecutionContext,
    handle: WorkflowHandle,
    summary_max_chars: usize,
}

impl WorkflowRunner {
    pub fn new(
        definition: WorkflowDefinition,
        factory: Arc<dyn CapabilityFactory>,
        integrations: Integrations,
    ) -> Result<Self> {
        definition.validate()?;

        let index = definition
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        let states = vec![StepState::default(); definition.steps.len()];
        let handle = WorkflowHandle::new();
        let dispatcher =
            StepDispatcher::new(factory, integrations, Globals::new(definition.globals));

        Ok(Self {
            name: definition.name,
            steps: definition.steps,
            index,
            states,
            dispatcher,
            context: ExecutionContext::new(handle.clone()),
            handle,
            summary_max_chars: 200,
        })
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.dispatcher = self.dispatcher.with_event_bus(event_bus);
        self
    }

    pub fn with_summary_max_chars(mut self, max_chars: usize) -> Self {
        self.summary_max_chars = max_chars;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A cloneable control handle for pause/resume/cancel from other tasks.
    pub fn handle(&self) -> WorkflowHandle {
        self.handle.clone()
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.index.get(id).map(|&i| &self.steps[i])
    }

    pub fn step_state(&self, id: &str) -> Option<&StepState> {
        self.index.get(id).map(|&i| &self.states[i])
    }

    /// Run the workflow and return its summary, or a failure message if a
    /// step aborted the run.
    pub async fn run(&mut self, params: HashMap<String, Value>) -> String {
        self.context = ExecutionContext::new(self.handle.clone());
        self.context.seed(params);
        for state in &mut self.states {
            *state = StepState::default();
        }

        let run_id = self.context.run_id().clone();
        let event_bus = self.dispatcher.event_bus().clone();
        self.handle.set(WorkflowStatus::Running);
        self.context.start();
        info!(
            run_id = %run_id,
            workflow = %self.name,
            steps = self.steps.len(),
            "Workflow started"
        );
        event_bus.publish(WorkflowEvent::RunStarted {
            run_id: run_id.clone(),
            workflow: self.name.clone(),
        });

        match self.traverse().await {
            Ok(()) => {
                let status = self.handle.finish(WorkflowStatus::Completed);
                self.context.finish();
                let elapsed_ms = self.context.elapsed_ms();
                if status == WorkflowStatus::Cancelled {
                    info!(run_id = %run_id, workflow = %self.name, "Workflow cancelled");
                    event_bus.publish(WorkflowEvent::RunCancelled { run_id });
                } else {
                    info!(
                        run_id = %run_id,
                        workflow = %self.name,
                        elapsed_ms,
                        "Workflow completed"
                    );
                    event_bus.publish(WorkflowEvent::RunCompleted { run_id, elapsed_ms });
                }

                build_summary(&SummaryInput {
                    workflow: &self.name,
                    status,
                    steps: &self.steps,
                    states: &self.states,
                    context: &self.context,
                    max_chars: self.summary_max_chars,
                })
            }
            Err(e) => {
                self.handle.set(WorkflowStatus::Failed);
                self.context.finish();
                error!(run_id = %run_id, workflow = %self.name, error = %e, "Workflow failed");
                event_bus.publish(WorkflowEvent::RunFailed {
                    run_id,
                    error: e.to_string(),
                });
                format!("Workflow '{}' failed: {}", self.name, e)
            }
        }
    }

    async fn traverse(&mut self) -> Result<()> {
        let run_id = self.context.run_id().clone();
        let mut queue: VecDeque<String> =
            self.steps.first().map(|s| s.id.clone()).into_iter().collect();
        let mut executed: HashSet<String> = HashSet::new();

        while !queue.is_empty() {
            if self.handle.wait_while_paused().await == WorkflowStatus::Cancelled {
                info!(run_id = %run_id, pending = queue.len(), "Stopping traversal after cancel");
                break;
            }
            let Some(current) = queue.pop_front() else {
                break;
            };

            if executed.contains(&current) {
                debug!(step_id = %current, "Step already executed, dropping");
                continue;
            }
            let Some(&idx) = self.index.get(&current) else {
                warn!(step_id = %current, "Next step not found, skipping");
                continue;
            };

            let step = &self.steps[idx];
            if !evaluate(&step.entry_conditions, &self.context.condition_context())? {
                info!(step_id = %current, "Entry conditions not met, skipping step");
                self.dispatcher.event_bus().publish(WorkflowEvent::StepSkipped {
                    run_id: run_id.clone(),
                    step_id: current,
                });
                continue;
            }

            self.dispatcher
                .execute_step(step, &mut self.states[idx], &mut self.context)
                .await?;
            executed.insert(current.clone());

            let next = self.next_steps(&current)?;
            debug!(step_id = %current, next = ?next, "Enqueueing next steps");
            queue.extend(next);
        }
        Ok(())
    }

    /// Successors of `step_id` eligible against the current context.
    ///
    /// A step without entry conditions of its own passes all of its next
    /// steps through unconditionally; otherwise each next step is kept only
    /// if its own entry conditions hold. Unknown next ids are passed
    /// through; an unknown `step_id` is `StepNotFound`.
    pub fn next_steps(&self, step_id: &str) -> Result<Vec<String>> {
        let step = self
            .step(step_id)
            .ok_or_else(|| TaskgraphError::StepNotFound(step_id.to_string()))?;
        if step.next_steps.is_empty() {
            return Ok(vec![]);
        }
        if step.entry_conditions.is_empty() {
            return Ok(step.next_steps.clone());
        }

        let ctx = self.context.condition_context();
        let mut eligible = Vec::new();
        for id in &step.next_steps {
            let passes = match self.step(id) {
                Some(next) => evaluate(&next.entry_conditions, &ctx)?,
                None => true,
            };
            if passes {
                eligible.push(id.clone());
            }
        }
        Ok(eligible)
    }

    pub fn status(&self) -> WorkflowStatusReport {
        let mut counts = StepCounts {
            total: self.states.len(),
            ..StepCounts::default()
        };
        for state in &self.states {
            match state.status {
                StepStatus::Pending => counts.pending += 1,
                StepStatus::Running => counts.running += 1,
                StepStatus::Completed => counts.completed += 1,
                StepStatus::Failed => counts.failed += 1,
            }
        }

        WorkflowStatusReport {
            workflow: self.name.clone(),
            status: self.handle.status(),
            started_at: self.context.started_at(),
            ended_at: self.context.ended_at(),
            step_counts: counts,
            execution_results_count: self.context.results().len(),
            session_state_keys: self.context.session_state_keys(),
        }
    }

    pub fn pause(&self) -> Result<()> {
        self.handle.pause()
    }

    pub fn resume(&self) -> Result<()> {
        self.handle.resume()
    }

    pub fn cancel(&self) -> Result<()> {
        self.handle.cancel()
    }
}

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use taskgraph_core::error::Result;
use taskgraph_core::event::EventBus;
use taskgraph_core::traits::CapabilityFactory;
use taskgraph_core::types::{timestamp, WorkflowEvent};
use taskgraph_integrations::Integrations;

use crate::cache::InstanceCache;
use crate::condition::evaluate;
use crate::context::ExecutionContext;
use crate::external::{execute_external, ExternalConfig, Globals};
use crate::parallel::execute_parallel;
use crate::step::{
    AgentStepConfig, ConditionStepConfig, Step, StepConfig, StepState, TaskKind, TeamStepConfig,
};

/// Routes steps to their handlers and applies the error policy.
pub struct StepDispatcher {
    factory: Arc<dyn CapabilityFactory>,
    integrations: Integrations,
    globals: Globals,
    cache: InstanceCache,
    event_bus: Arc<EventBus>,
}

impl StepDispatcher {
    pub fn new(
        factory: Arc<dyn CapabilityFactory>,
        integrations: Integrations,
        globals: Globals,
    ) -> Self {
        Self {
            factory,
            integrations,
            globals,
            cache: InstanceCache::new(),
            event_bus: Arc::new(EventBus::default()),
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn cache(&self) -> &InstanceCache {
        &self.cache
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Execute one step, updating its state and recording its result.
    ///
    /// With `continue_on_error` a failure is recorded as
    /// `{"error": message, "continued": true}` and returned as success;
    /// otherwise the error is returned and the run should abort.
    pub async fn execute_step(
        &self,
        step: &Step,
        state: &mut StepState,
        context: &mut ExecutionContext,
    ) -> Result<Value> {
        let run_id = context.run_id().clone();
        state.start();
        info!(step_id = %step.id, step_type = %step.step_type(), "Executing step");
        self.event_bus.publish(WorkflowEvent::StepStarted {
            run_id: run_id.clone(),
            step_id: step.id.clone(),
            step_type: step.step_type().to_string(),
        });

        match self.run_handler(step, context).await {
            Ok(result) => {
                state.complete(result.clone());
                context.record(&step.id, result.clone());
                info!(step_id = %step.id, elapsed_ms = state.elapsed_ms(), "Step completed");
                self.event_bus.publish(WorkflowEvent::StepCompleted {
                    run_id,
                    step_id: step.id.clone(),
                    elapsed_ms: state.elapsed_ms(),
                });
                Ok(result)
            }
            Err(e) => {
                let message = e.to_string();
                state.fail(&message);
                let continued = step.error_policy.continue_on_error;
                self.event_bus.publish(WorkflowEvent::StepFailed {
                    run_id,
                    step_id: step.id.clone(),
                    error: message.clone(),
                    continued,
                });

                if continued {
                    warn!(step_id = %step.id, error = %message, "Step failed, continuing");
                    let result = json!({ "error": message, "continued": true });
                    context.record(&step.id, result.clone());
                    Ok(result)
                } else {
                    error!(step_id = %step.id, error = %message, "Step failed");
                    Err(e)
                }
            }
        }
    }

    async fn run_handler(&self, step: &Step, context: &ExecutionContext) -> Result<Value> {
        match &step.config {
            StepConfig::Agent(config) => self.run_agent(&step.id, config, context).await,
            StepConfig::Team(config) => self.run_team(&step.id, config, context).await,
            StepConfig::Condition(config) => self.run_condition(&step.id, config, context),
            StepConfig::External(config) => self.run_external(&step.id, config).await,
            StepConfig::Parallel(config) => {
                Ok(execute_parallel(self, &step.id, config, context).await)
            }
        }
    }

    /// Run one parallel sub-task under its synthesized step id.
    pub(crate) async fn run_task(
        &self,
        task_id: &str,
        kind: &TaskKind,
        context: &ExecutionContext,
    ) -> Result<Value> {
        match kind {
            TaskKind::Agent(config) => self.run_agent(task_id, config, context).await,
            TaskKind::Team(config) => self.run_team(task_id, config, context).await,
            TaskKind::External(config) => self.run_external(task_id, config).await,
        }
    }

    async fn run_agent(
        &self,
        step_id: &str,
        config: &AgentStepConfig,
        context: &ExecutionContext,
    ) -> Result<Value> {
        let agent = self.cache.agent(step_id, &config.agent, self.factory.as_ref())?;
        let task = context.render_task(&config.task, &config.input_keys);
        debug!(step_id = %step_id, agent = %agent.name(), "Running agent");
        let output = agent.run(task).await?;

        Ok(json!({
            "step_id": step_id,
            "result": output.content,
            "agent_name": agent.name(),
            "timestamp": timestamp(),
        }))
    }

    async fn run_team(
        &self,
        step_id: &str,
        config: &TeamStepConfig,
        context: &ExecutionContext,
    ) -> Result<Value> {
        let team = self.cache.team(step_id, &config.team, self.factory.as_ref())?;
        let task = context.render_task(&config.task, &config.input_keys);
        debug!(step_id = %step_id, team = %team.name(), mode = %team.mode(), "Running team");
        let output = team.run(task).await?;

        Ok(json!({
            "step_id": step_id,
            "result": output.content,
            "team_name": team.name(),
            "mode": team.mode().to_string(),
            "timestamp": timestamp(),
        }))
    }

    // The boolean is informational: successors are gated by their own
    // entry conditions, not by this result.
    fn run_condition(
        &self,
        step_id: &str,
        config: &ConditionStepConfig,
        context: &ExecutionContext,
    ) -> Result<Value> {
        let snapshot = context.snapshot_for(step_id);
        let result = evaluate(std::slice::from_ref(&config.condition), &snapshot)?;
        debug!(step_id = %step_id, result, "Condition evaluated");

        Ok(json!({
            "step_id": step_id,
            "condition_result": result,
            "evaluated_context": snapshot,
            "timestamp": timestamp(),
        }))
    }

    async fn run_external(&self, step_id: &str, config: &ExternalConfig) -> Result<Value> {
        let result = execute_external(&self.integrations, config, &self.globals).await?;
        Ok(json!({
            "step_id": step_id,
            "integration_type": config.integration_type(),
            "result": result,
            "timestamp": timestamp(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::handle::WorkflowHandle;
    use serde_json::json;
    use std::collections::HashMap;
    use taskgraph_core::error::TaskgraphError;
    use taskgraph_core::types::{StepStatus, TeamMode, TeamSpec, WorkflowStatus};
    use taskgraph_test_utils::{MemoryFileStore, MockCapabilities};

    fn dispatcher(factory: Arc<MockCapabilities>) -> StepDispatcher {
        let integrations = Integrations::new().with_files(Arc::new(MemoryFileStore::new()));
        StepDispatcher::new(factory, integrations, Globals::default())
    }

    fn context() -> ExecutionContext {
        let handle = WorkflowHandle::new();
        handle.set(WorkflowStatus::Running);
        ExecutionContext::new(handle)
    }

    #[tokio::test]
    async fn test_agent_step_result_shape() {
        let factory = Arc::new(MockCapabilities::new().respond("Analyzer", "looks fine"));
        let dispatcher = dispatcher(factory.clone());
        let mut ctx = context();
        let mut state = StepState::default();
        let step = Step::agent("analyze", "Analyzer", "Analyze it");

        let result = dispatcher.execute_step(&step, &mut state, &mut ctx).await.unwrap();
        assert_eq!(result["step_id"], "analyze");
        assert_eq!(result["result"], "looks fine");
        assert_eq!(result["agent_name"], "Analyzer");
        assert!(result["timestamp"].is_string());

        assert_eq!(state.status, StepStatus::Completed);
        assert_eq!(ctx.result("analyze"), Some(&result));
        assert!(dispatcher.cache().contains("agent:analyze"));
    }

    #[tokio::test]
    async fn test_agent_reused_across_executions() {
        let factory = Arc::new(MockCapabilities::new());
        let dispatcher = dispatcher(factory.clone());
        let mut ctx = context();
        let step = Step::agent("a", "Agent", "task");

        dispatcher.execute_step(&step, &mut StepState::default(), &mut ctx).await.unwrap();
        dispatcher.execute_step(&step, &mut StepState::default(), &mut ctx).await.unwrap();
        assert_eq!(factory.agents_created(), 1);
        assert_eq!(factory.calls_for("Agent").len(), 2);
    }

    #[tokio::test]
    async fn test_team_step_result_shape() {
        let factory = Arc::new(MockCapabilities::new().respond("reviewers", "approved"));
        let dispatcher = dispatcher(factory);
        let mut ctx = context();
        let team = TeamSpec {
            name: "reviewers".into(),
            mode: TeamMode::Collaborate,
            members: vec![],
        };
        let step = Step::team("review", "Review", "Review it", team);

        let result = dispatcher
            .execute_step(&step, &mut StepState::default(), &mut ctx)
            .await
            .unwrap();
        assert_eq!(result["team_name"], "reviewers");
        assert_eq!(result["mode"], "collaborate");
        assert_eq!(result["result"], "approved");
        assert!(dispatcher.cache().contains("team:review"));
    }

    #[tokio::test]
    async fn test_condition_step_snapshot() {
        let dispatcher = dispatcher(Arc::new(MockCapabilities::new()));
        let mut ctx = context();
        ctx.seed(HashMap::from([("score".to_string(), json!(7))]));
        let step = Step::condition("gate", "Gate", Condition::greater_than("score", json!(5)));

        let result = dispatcher
            .execute_step(&step, &mut StepState::default(), &mut ctx)
            .await
            .unwrap();
        assert_eq!(result["condition_result"], true);
        assert_eq!(result["evaluated_context"]["current_step_id"], "gate");
        assert_eq!(result["evaluated_context"]["workflow_status"], "running");
        assert_eq!(result["evaluated_context"]["score"], 7);
    }

    #[tokio::test]
    async fn test_condition_step_false_still_completes() {
        let dispatcher = dispatcher(Arc::new(MockCapabilities::new()));
        let mut ctx = context();
        let mut state = StepState::default();
        let step = Step::condition("gate", "Gate", Condition::exists("nothing"));

        let result = dispatcher.execute_step(&step, &mut state, &mut ctx).await.unwrap();
        assert_eq!(result["condition_result"], false);
        assert_eq!(state.status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn test_external_step_wraps_result() {
        let dispatcher = dispatcher(Arc::new(MockCapabilities::new()));
        let mut ctx = context();
        let config = ExternalConfig::from_value(
            "save",
            json!({"integration_type": "file", "operation": "write", "path": "/tmp/x", "content": "hi"}),
        )
        .unwrap();
        let step = Step::external("save", "Save", config);

        let result = dispatcher
            .execute_step(&step, &mut StepState::default(), &mut ctx)
            .await
            .unwrap();
        assert_eq!(result["integration_type"], "file");
        assert_eq!(result["result"]["bytes_written"], 2);
    }

    #[tokio::test]
    async fn test_failure_aborts_by_default() {
        let factory = Arc::new(MockCapabilities::new().fail("Broken", "model offline"));
        let dispatcher = dispatcher(factory);
        let mut ctx = context();
        let mut state = StepState::default();
        let step = Step::agent("b", "Broken", "task");

        let err = dispatcher.execute_step(&step, &mut state, &mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("model offline"));
        assert_eq!(state.status, StepStatus::Failed);
        assert!(state.error.as_deref().unwrap().contains("model offline"));
        assert!(ctx.result("b").is_none());
    }

    #[tokio::test]
    async fn test_continue_on_error_records_payload() {
        let factory = Arc::new(MockCapabilities::new().fail("Broken", "model offline"));
        let dispatcher = dispatcher(factory);
        let mut ctx = context();
        let mut state = StepState::default();
        let step = Step::agent("b", "Broken", "task").continue_on_error();

        let result = dispatcher.execute_step(&step, &mut state, &mut ctx).await.unwrap();
        assert_eq!(result["continued"], true);
        assert!(result["error"].as_str().unwrap().contains("model offline"));
        assert_eq!(state.status, StepStatus::Failed);
        assert_eq!(ctx.result("b"), Some(&result));
    }

    #[tokio::test]
    async fn test_missing_integration_is_unsupported() {
        let dispatcher = dispatcher(Arc::new(MockCapabilities::new()));
        let mut ctx = context();
        let config = ExternalConfig::from_value(
            "fetch",
            json!({"integration_type": "http", "url": "https://example.com"}),
        )
        .unwrap();
        let step = Step::external("fetch", "Fetch", config);

        let err = dispatcher
            .execute_step(&step, &mut StepState::default(), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskgraphError::UnsupportedIntegrationType(t) if t == "http"));
    }

    #[tokio::test]
    async fn test_step_events_published() {
        let factory = Arc::new(MockCapabilities::new().fail("Broken", "nope"));
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let dispatcher = dispatcher(factory).with_event_bus(bus);
        let mut ctx = context();
        let step = Step::agent("b", "Broken", "task").continue_on_error();

        dispatcher
            .execute_step(&step, &mut StepState::default(), &mut ctx)
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            WorkflowEvent::StepStarted { ref step_id, .. } if step_id == "b"
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            WorkflowEvent::StepFailed { continued: true, .. }
        ));
    }
}

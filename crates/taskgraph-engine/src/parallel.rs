use serde_json::{json, Value};
use tracing::{info, warn};

use taskgraph_core::types::timestamp;

use crate::context::ExecutionContext;
use crate::dispatcher::StepDispatcher;
use crate::step::ParallelConfig;

/// Id of the transient step built for one parallel sub-task.
pub fn sub_step_id(parent: &str, task_name: &str) -> String {
    format!("{}_{}", parent, task_name)
}

/// Run every sub-task of a parallel step concurrently and aggregate.
///
/// A failing sub-task is captured in its own outcome entry; it never cancels
/// its siblings and never fails the parent. Sub-task results are collected
/// locally and only the aggregate is returned.
pub async fn execute_parallel(
    dispatcher: &StepDispatcher,
    step_id: &str,
    config: &ParallelConfig,
    context: &ExecutionContext,
) -> Value {
    info!(step_id = %step_id, tasks = config.tasks.len(), "Fanning out parallel tasks");

    let futs: Vec<_> = config
        .tasks
        .iter()
        .enumerate()
        .map(|(index, task)| async move {
            let task_id = sub_step_id(step_id, &task.name);
            match dispatcher.run_task(&task_id, &task.kind, context).await {
                Ok(result) => json!({
                    "task_index": index,
                    "task_name": task.name,
                    "status": "success",
                    "result": result,
                    "timestamp": timestamp(),
                }),
                Err(e) => {
                    warn!(
                        step_id = %step_id,
                        task = %task.name,
                        error = %e,
                        "Parallel task failed"
                    );
                    json!({
                        "task_index": index,
                        "task_name": task.name,
                        "status": "error",
                        "error": e.to_string(),
                        "timestamp": timestamp(),
                    })
                }
            }
        })
        .collect();

    let outcomes = futures::future::join_all(futs).await;
    let successful = outcomes.iter().filter(|o| o["status"] == "success").count();
    let failed = outcomes.len() - successful;

    info!(
        step_id = %step_id,
        successful,
        failed,
        "Parallel tasks joined"
    );

    json!({
        "step_id": step_id,
        "total_tasks": outcomes.len(),
        "successful_tasks": successful,
        "failed_tasks": failed,
        "parallel_results": outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{ExternalConfig, Globals};
    use crate::handle::WorkflowHandle;
    use crate::step::{ParallelTask, Step, StepState};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use taskgraph_core::types::{StepStatus, WorkflowStatus};
    use taskgraph_integrations::Integrations;
    use taskgraph_test_utils::MockCapabilities;

    fn context() -> ExecutionContext {
        let handle = WorkflowHandle::new();
        handle.set(WorkflowStatus::Running);
        ExecutionContext::new(handle)
    }

    #[test]
    fn test_sub_step_id() {
        assert_eq!(sub_step_id("fan", "search"), "fan_search");
    }

    #[tokio::test]
    async fn test_one_failure_is_isolated() {
        let factory = Arc::new(
            MockCapabilities::new()
                .respond("one", "1")
                .fail("two", "exploded")
                .respond("three", "3"),
        );
        let dispatcher =
            StepDispatcher::new(factory.clone(), Integrations::new(), Globals::default());
        let mut ctx = context();
        let mut state = StepState::default();
        let step = Step::parallel(
            "fan",
            "Fan out",
            vec![
                ParallelTask::agent("one", "first"),
                ParallelTask::agent("two", "second"),
                ParallelTask::agent("three", "third"),
            ],
        );

        let result = dispatcher.execute_step(&step, &mut state, &mut ctx).await.unwrap();
        assert_eq!(state.status, StepStatus::Completed);
        assert_eq!(result["step_id"], "fan");
        assert_eq!(result["total_tasks"], 3);
        assert_eq!(result["successful_tasks"], 2);
        assert_eq!(result["failed_tasks"], 1);

        let outcomes = result["parallel_results"].as_array().unwrap();
        assert_eq!(outcomes[0]["task_index"], 0);
        assert_eq!(outcomes[0]["status"], "success");
        assert_eq!(outcomes[0]["result"]["result"], "1");
        assert_eq!(outcomes[1]["status"], "error");
        assert!(outcomes[1]["error"].as_str().unwrap().contains("exploded"));
        assert_eq!(outcomes[2]["task_index"], 2);

        // Only the parent is recorded.
        assert_eq!(ctx.results().len(), 1);
        assert!(dispatcher.cache().contains("agent:fan_one"));
        assert!(dispatcher.cache().contains("agent:fan_three"));
    }

    #[tokio::test]
    async fn test_external_task_without_handler_fails_alone() {
        let factory = Arc::new(MockCapabilities::new());
        let dispatcher = StepDispatcher::new(factory, Integrations::new(), Globals::default());
        let ctx = context();
        let config = ParallelConfig {
            tasks: vec![
                ParallelTask::agent("ok", "fine"),
                ParallelTask::external(
                    "db",
                    ExternalConfig::from_value(
                        "db",
                        json!({"integration_type": "database", "query": "SELECT 1"}),
                    )
                    .unwrap(),
                ),
            ],
        };

        let result = execute_parallel(&dispatcher, "p", &config, &ctx).await;
        assert_eq!(result["successful_tasks"], 1);
        assert_eq!(result["failed_tasks"], 1);
        assert_eq!(result["parallel_results"][1]["task_name"], "db");
    }

    #[tokio::test]
    async fn test_tasks_run_concurrently() {
        let factory = Arc::new(
            MockCapabilities::new()
                .delay("a", Duration::from_millis(100))
                .delay("b", Duration::from_millis(100))
                .delay("c", Duration::from_millis(100)),
        );
        let dispatcher = StepDispatcher::new(factory, Integrations::new(), Globals::default());
        let ctx = context();
        let config = ParallelConfig {
            tasks: vec![
                ParallelTask::agent("a", "x"),
                ParallelTask::agent("b", "y"),
                ParallelTask::agent("c", "z"),
            ],
        };

        let start = Instant::now();
        let result = execute_parallel(&dispatcher, "p", &config, &ctx).await;
        assert_eq!(result["successful_tasks"], 3);
        assert!(start.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_empty_task_list() {
        let dispatcher =
            StepDispatcher::new(
                Arc::new(MockCapabilities::new()),
                Integrations::new(),
                Globals::default(),
            );
        let ctx = context();
        let empty = ParallelConfig { tasks: vec![] };
        let result = execute_parallel(&dispatcher, "p", &empty, &ctx).await;
        assert_eq!(result["total_tasks"], 0);
        assert_eq!(result["failed_tasks"], 0);
    }
}

use std::fmt::Write;

use serde_json::Value;

use taskgraph_core::types::{StepStatus, WorkflowStatus};

use crate::context::ExecutionContext;
use crate::step::{Step, StepState};

/// Inputs for a run report.
pub struct SummaryInput<'a> {
    pub workflow: &'a str,
    pub status: WorkflowStatus,
    pub steps: &'a [Step],
    pub states: &'a [StepState],
    pub context: &'a ExecutionContext,
    pub max_chars: usize,
}

/// Render a human-readable report of a finished run.
pub fn build_summary(input: &SummaryInput<'_>) -> String {
    let completed = count(input.states, StepStatus::Completed);
    let failed = count(input.states, StepStatus::Failed);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Workflow '{}' {} in {:.2}s",
        input.workflow,
        input.status,
        input.context.elapsed_ms() as f64 / 1000.0
    );
    let _ = writeln!(
        out,
        "Steps: {} completed, {} failed, {} total",
        completed,
        failed,
        input.steps.len()
    );
    out.push('\n');

    for (step, state) in input.steps.iter().zip(input.states) {
        let line = match state.status {
            StepStatus::Completed => {
                let rendered = state.result.as_ref().map(render_result).unwrap_or_default();
                format!(
                    "✅ {} ({}): {}",
                    step.name,
                    step.step_type(),
                    truncate(&rendered, input.max_chars)
                )
            }
            StepStatus::Failed => format!(
                "❌ {} ({}): {}",
                step.name,
                step.step_type(),
                state.error.as_deref().unwrap_or("unknown error")
            ),
            StepStatus::Pending | StepStatus::Running => {
                format!("⏭️ {} ({}): not executed", step.name, step.step_type())
            }
        };
        out.push_str(&line);
        out.push('\n');
    }

    out.push('\n');
    let _ = writeln!(out, "Results recorded: {}", input.context.results().len());
    let keys = input.context.session_state_keys();
    if keys.is_empty() {
        out.push_str("Session state keys: (none)");
    } else {
        let _ = write!(out, "Session state keys: {}", keys.join(", "));
    }
    out
}

fn count(states: &[StepState], status: StepStatus) -> usize {
    states.iter().filter(|s| s.status == status).count()
}

/// Show the inner `result` of a wrapped payload, otherwise the value itself.
fn render_result(value: &Value) -> String {
    let inner = value.get("result").unwrap_or(value);
    match inner {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut with "...".
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::handle::WorkflowHandle;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly10!", 10), "exactly10!");
        assert_eq!(truncate("this is too long", 10), "this is...");
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn test_render_result_unwraps() {
        assert_eq!(render_result(&json!({"result": "text"})), "text");
        assert_eq!(render_result(&json!({"result": {"a": 1}})), r#"{"a":1}"#);
        assert_eq!(
            render_result(&json!({"condition_result": true})),
            r#"{"condition_result":true}"#
        );
    }

    #[test]
    fn test_summary_lines() {
        let steps = vec![
            Step::agent("a", "Analyze", "task"),
            Step::agent("b", "Broken", "task"),
            Step::condition("c", "Check", Condition::exists("x")),
        ];
        let mut states = vec![StepState::default(); 3];
        states[0].start();
        states[0].complete(json!({"result": "x".repeat(300)}));
        states[1].start();
        states[1].fail("model offline");

        let mut ctx = ExecutionContext::new(WorkflowHandle::new());
        ctx.record("a", json!({}));
        ctx.seed(HashMap::from([("topic".to_string(), json!("t"))]));

        let summary = build_summary(&SummaryInput {
            workflow: "demo",
            status: WorkflowStatus::Completed,
            steps: &steps,
            states: &states,
            context: &ctx,
            max_chars: 200,
        });

        assert!(summary.starts_with("Workflow 'demo' completed in"));
        assert!(summary.contains("Steps: 1 completed, 1 failed, 3 total"));
        let analyze = summary.lines().find(|l| l.starts_with("✅ Analyze (agent): ")).unwrap();
        assert!(analyze.ends_with("..."));
        assert_eq!(analyze.trim_start_matches("✅ Analyze (agent): ").chars().count(), 200);
        assert!(summary.contains("❌ Broken (agent): model offline"));
        assert!(summary.contains("⏭️ Check (condition): not executed"));
        assert!(summary.contains("Results recorded: 1"));
        assert!(summary.ends_with("Session state keys: topic"));
    }
}

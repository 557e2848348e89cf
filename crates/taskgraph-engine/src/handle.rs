use std::sync::Arc;

use tokio::sync::watch;

use taskgraph_core::error::{Result, TaskgraphError};
use taskgraph_core::types::WorkflowStatus;

/// Shared, cloneable view of a workflow's status.
///
/// The runner drives the lifecycle transitions; callers holding a clone can
/// pause, resume, or cancel. Controls take effect at step boundaries only:
/// a step that is already running is never interrupted.
#[derive(Clone)]
pub struct WorkflowHandle {
    tx: Arc<watch::Sender<WorkflowStatus>>,
}

impl WorkflowHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(WorkflowStatus::Pending);
        Self { tx: Arc::new(tx) }
    }

    pub fn status(&self) -> WorkflowStatus {
        *self.tx.borrow()
    }

    /// Running → Paused.
    pub fn pause(&self) -> Result<()> {
        self.transition("pause", &[WorkflowStatus::Running], WorkflowStatus::Paused)
    }

    /// Paused → Running.
    pub fn resume(&self) -> Result<()> {
        self.transition("resume", &[WorkflowStatus::Paused], WorkflowStatus::Running)
    }

    /// Running or Paused → Cancelled.
    pub fn cancel(&self) -> Result<()> {
        self.transition(
            "cancel",
            &[WorkflowStatus::Running, WorkflowStatus::Paused],
            WorkflowStatus::Cancelled,
        )
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowStatus> {
        self.tx.subscribe()
    }

    pub(crate) fn set(&self, status: WorkflowStatus) {
        self.tx.send_replace(status);
    }

    /// Move to `status` unless the run was cancelled meanwhile. Returns the
    /// status the run ends up in.
    pub(crate) fn finish(&self, status: WorkflowStatus) -> WorkflowStatus {
        self.tx.send_if_modified(|current| {
            if *current == WorkflowStatus::Cancelled {
                false
            } else {
                *current = status;
                true
            }
        });
        self.status()
    }

    /// Block while paused. Returns the status that ended the wait.
    pub(crate) async fn wait_while_paused(&self) -> WorkflowStatus {
        let mut rx = self.tx.subscribe();
        let status = match rx.wait_for(|s| *s != WorkflowStatus::Paused).await {
            Ok(status) => *status,
            Err(_) => self.status(),
        };
        status
    }

    fn transition(
        &self,
        action: &str,
        allowed: &[WorkflowStatus],
        to: WorkflowStatus,
    ) -> Result<()> {
        let mut from = WorkflowStatus::Pending;
        let changed = self.tx.send_if_modified(|current| {
            from = *current;
            if allowed.contains(current) {
                *current = to;
                true
            } else {
                false
            }
        });
        if changed {
            Ok(())
        } else {
            Err(TaskgraphError::InvalidTransition {
                from: from.to_string(),
                action: action.to_string(),
            })
        }
    }
}

impl Default for WorkflowHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WorkflowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowHandle")
            .field("status", &self.status())
            .finish()
    }
}

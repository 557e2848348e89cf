//! Workflow graph execution engine.
//!
//! A workflow is an ordered list of steps linked by next-step ids. The
//! runner walks the graph breadth-first from the first step, gating each
//! step on its entry conditions and dispatching it to the agent, team,
//! condition, external, or parallel handler.
//!
//! ```text
//!   [analyze] ──→ [classify] ──→ [deep_dive]  (entry: analyze contains "complex")
//!                          └───→ [quick_fix]  (entry: analyze not_contains "complex")
//!                                      ↓
//!                                  [report]
//! ```
//!
//! Branching is driven by the entry conditions of candidate next steps, not
//! by the boolean a condition step produces.

pub mod cache;
pub mod condition;
pub mod context;
pub mod definition;
pub mod dispatcher;
pub mod external;
pub mod handle;
pub mod parallel;
pub mod runner;
pub mod step;
pub mod summary;
pub mod team;

pub use cache::InstanceCache;
pub use condition::{evaluate, Condition, ConditionKind, Context, LogicalOperator};
pub use context::ExecutionContext;
pub use definition::WorkflowDefinition;
pub use dispatcher::StepDispatcher;
pub use external::{ExternalConfig, Globals};
pub use handle::WorkflowHandle;
pub use runner::{StepCounts, WorkflowRunner, WorkflowStatusReport};
pub use step::{ErrorPolicy, ParallelTask, Step, StepConfig, StepState, StepType, TaskKind};
pub use team::AgentTeam;

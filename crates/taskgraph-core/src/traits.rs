use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// Agent: runs one task description and returns its content.
pub trait AgentCapability: Send + Sync + 'static {
    /// Agent name (reported in step results).
    fn name(&self) -> &str;

    /// Run a task.
    fn run(&self, task: String) -> BoxFuture<'_, Result<CapabilityOutput>>;
}

/// Team: a named collaboration of agents behind a single entry point.
pub trait TeamCapability: Send + Sync + 'static {
    /// Team name (reported in step results).
    fn name(&self) -> &str;

    /// Collaboration mode the team runs in.
    fn mode(&self) -> TeamMode;

    /// Run a task.
    fn run(&self, task: String) -> BoxFuture<'_, Result<CapabilityOutput>>;
}

/// Builds agent and team instances on first use.
///
/// The engine caches what the factory returns, one instance per step.
pub trait CapabilityFactory: Send + Sync + 'static {
    fn create_agent(&self, spec: &AgentSpec) -> Result<Arc<dyn AgentCapability>>;

    fn create_team(&self, spec: &TeamSpec) -> Result<Arc<dyn TeamCapability>>;
}

/// HTTP transport used by external http steps.
pub trait HttpClient: Send + Sync + 'static {
    fn call(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>>;
}

/// File access used by external file steps.
pub trait FileStore: Send + Sync + 'static {
    /// Read the whole file as UTF-8.
    fn read(&self, path: PathBuf) -> BoxFuture<'_, Result<String>>;

    /// Replace the file's content, returning bytes written.
    fn write(&self, path: PathBuf, content: String) -> BoxFuture<'_, Result<usize>>;

    /// Append to the file (creating it), returning bytes written.
    fn append(&self, path: PathBuf, content: String) -> BoxFuture<'_, Result<usize>>;
}

/// Database access used by external database steps.
pub trait DatabaseClient: Send + Sync + 'static {
    fn exec(&self, operation: String, query: String) -> BoxFuture<'_, Result<serde_json::Value>>;
}

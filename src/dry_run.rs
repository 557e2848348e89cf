use std::sync::Arc;

use futures::future::BoxFuture;

use taskgraph_core::error::Result;
use taskgraph_core::traits::{AgentCapability, CapabilityFactory, TeamCapability};
use taskgraph_core::types::{AgentSpec, CapabilityOutput, TeamSpec};
use taskgraph_engine::AgentTeam;

/// Agent that answers with its own task. Used by `run --dry-run`.
pub struct EchoAgent {
    name: String,
}

impl AgentCapability for EchoAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, task: String) -> BoxFuture<'_, Result<CapabilityOutput>> {
        Box::pin(async move { Ok(CapabilityOutput::new(format!("[{}] {}", self.name, task))) })
    }
}

pub struct EchoCapabilities;

impl CapabilityFactory for EchoCapabilities {
    fn create_agent(&self, spec: &AgentSpec) -> Result<Arc<dyn AgentCapability>> {
        Ok(Arc::new(EchoAgent {
            name: spec.name.clone(),
        }))
    }

    fn create_team(&self, spec: &TeamSpec) -> Result<Arc<dyn TeamCapability>> {
        Ok(Arc::new(AgentTeam::build(spec, self)?))
    }
}

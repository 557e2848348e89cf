use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use taskgraph_core::error::Result;
use taskgraph_core::traits::{AgentCapability, CapabilityFactory, TeamCapability};
use taskgraph_core::types::{AgentSpec, TeamSpec};

/// Lazily created agent and team instances, one per step.
///
/// Owned by a single runner; instances never leak across workflows.
#[derive(Default)]
pub struct InstanceCache {
    agents: Mutex<HashMap<String, Arc<dyn AgentCapability>>>,
    teams: Mutex<HashMap<String, Arc<dyn TeamCapability>>>,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the agent for `step_id`, creating it on first use.
    pub fn agent(
        &self,
        step_id: &str,
        spec: &AgentSpec,
        factory: &dyn CapabilityFactory,
    ) -> Result<Arc<dyn AgentCapability>> {
        let key = format!("agent:{}", step_id);
        let mut agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(agent) = agents.get(&key) {
            return Ok(agent.clone());
        }

        let agent = factory.create_agent(spec)?;
        debug!(key = %key, agent = %agent.name(), "Created agent instance");
        agents.insert(key, agent.clone());
        Ok(agent)
    }

    /// Get the team for `step_id`, creating it on first use.
    pub fn team(
        &self,
        step_id: &str,
        spec: &TeamSpec,
        factory: &dyn CapabilityFactory,
    ) -> Result<Arc<dyn TeamCapability>> {
        let key = format!("team:{}", step_id);
        let mut teams = self.teams.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(team) = teams.get(&key) {
            return Ok(team.clone());
        }

        let team = factory.create_team(spec)?;
        debug!(key = %key, team = %team.name(), "Created team instance");
        teams.insert(key, team.clone());
        Ok(team)
    }

    pub fn contains(&self, key: &str) -> bool {
        if key.starts_with("team:") {
            self.teams
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(key)
        } else {
            self.agents
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(key)
        }
    }

    pub fn len(&self) -> usize {
        let agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner).len();
        let teams = self.teams.lock().unwrap_or_else(PoisonError::into_inner).len();
        agents + teams
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached instance.
    pub fn clear(&self) {
        self.agents.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.teams.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;

use taskgraph_core::error::{Result, TaskgraphError};
use taskgraph_core::traits::{AgentCapability, CapabilityFactory, TeamCapability};
use taskgraph_core::types::{AgentSpec, CapabilityOutput, TeamMode, TeamSpec};

/// What a mock agent or team does when run.
#[derive(Debug, Clone)]
enum Behavior {
    Respond(String),
    Fail(String),
}

#[derive(Default)]
struct Shared {
    behaviors: Mutex<HashMap<String, Behavior>>,
    delays: Mutex<HashMap<String, Duration>>,
    rejected: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(String, String)>>,
    agents_created: AtomicUsize,
    teams_created: AtomicUsize,
}

impl Shared {
    async fn run(&self, name: &str, task: String) -> Result<CapabilityOutput> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), task.clone()));

        let delay = self
            .delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let behavior = self
            .behaviors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        match behavior {
            Some(Behavior::Respond(content)) => Ok(CapabilityOutput::new(content)),
            Some(Behavior::Fail(message)) => Err(TaskgraphError::Capability {
                name: name.to_string(),
                message,
            }),
            None => Ok(CapabilityOutput::new(format!("[{}] {}", name, task))),
        }
    }
}

/// Capability factory producing scripted agents and teams.
///
/// Behaviour is keyed by agent or team name. Unscripted names echo their
/// task back as `"[name] task"`.
#[derive(Clone, Default)]
pub struct MockCapabilities {
    shared: Arc<Shared>,
}

impl MockCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `name` return `content`.
    pub fn respond(self, name: &str, content: &str) -> Self {
        self.set(name, Behavior::Respond(content.to_string()));
        self
    }

    /// Make `name` fail with `message`.
    pub fn fail(self, name: &str, message: &str) -> Self {
        self.set(name, Behavior::Fail(message.to_string()));
        self
    }

    /// Make `name` sleep before answering.
    pub fn delay(self, name: &str, delay: Duration) -> Self {
        self.shared
            .delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), delay);
        self
    }

    /// Make the factory refuse to create an agent called `name`.
    pub fn reject_agent(self, name: &str) -> Self {
        self.shared
            .rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
        self
    }

    fn set(&self, name: &str, behavior: Behavior) {
        self.shared
            .behaviors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), behavior);
    }

    /// Every `(name, task)` pair run so far, in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.shared
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Tasks received by `name`, in call order.
    pub fn calls_for(&self, name: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(n, _)| n == name)
            .map(|(_, task)| task)
            .collect()
    }

    /// Names in the order they were first run.
    pub fn call_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        for (name, _) in self.calls() {
            if !order.contains(&name) {
                order.push(name);
            }
        }
        order
    }

    pub fn agents_created(&self) -> usize {
        self.shared.agents_created.load(Ordering::SeqCst)
    }

    pub fn teams_created(&self) -> usize {
        self.shared.teams_created.load(Ordering::SeqCst)
    }
}

impl CapabilityFactory for MockCapabilities {
    fn create_agent(&self, spec: &AgentSpec) -> Result<Arc<dyn AgentCapability>> {
        let rejected = self
            .shared
            .rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&spec.name);
        if rejected {
            return Err(TaskgraphError::Capability {
                name: spec.name.clone(),
                message: "rejected by mock factory".into(),
            });
        }

        self.shared.agents_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockAgent {
            name: spec.name.clone(),
            shared: self.shared.clone(),
        }))
    }

    fn create_team(&self, spec: &TeamSpec) -> Result<Arc<dyn TeamCapability>> {
        self.shared.teams_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockTeam {
            name: spec.name.clone(),
            mode: spec.mode,
            shared: self.shared.clone(),
        }))
    }
}

/// Agent created by `MockCapabilities`.
pub struct MockAgent {
    name: String,
    shared: Arc<Shared>,
}

impl AgentCapability for MockAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, task: String) -> BoxFuture<'_, Result<CapabilityOutput>> {
        Box::pin(self.shared.run(&self.name, task))
    }
}

/// Team created by `MockCapabilities`; behaves as a single scripted unit.
pub struct MockTeam {
    name: String,
    mode: TeamMode,
    shared: Arc<Shared>,
}

impl TeamCapability for MockTeam {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> TeamMode {
        self.mode
    }

    fn run(&self, task: String) -> BoxFuture<'_, Result<CapabilityOutput>> {
        Box::pin(self.shared.run(&self.name, task))
    }
}

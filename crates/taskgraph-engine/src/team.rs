use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use taskgraph_core::error::{Result, TaskgraphError};
use taskgraph_core::traits::{AgentCapability, CapabilityFactory, TeamCapability};
use taskgraph_core::types::{AgentSpec, CapabilityOutput, TeamMode, TeamSpec};

struct Member {
    spec: AgentSpec,
    agent: Arc<dyn AgentCapability>,
}

impl Member {
    /// Score how well this member matches a task description.
    fn match_score(&self, task: &str) -> f64 {
        let task_lower = task.to_lowercase();
        self.spec
            .specializations
            .iter()
            .filter(|s| task_lower.contains(&s.to_lowercase()))
            .count() as f64
            * 10.0
    }
}

/// A team of agents composed from a `TeamSpec`.
///
/// - `Route`: the member whose specializations best match the task runs it
///   alone (first member on ties).
/// - `Coordinate`: members run in order, each seeing the previous output.
/// - `Collaborate`: all members run concurrently; outputs are joined into
///   one section per member. Failed members are dropped.
pub struct AgentTeam {
    name: String,
    mode: TeamMode,
    members: Vec<Member>,
}

impl AgentTeam {
    /// Build every member through `factory`.
    pub fn build(spec: &TeamSpec, factory: &dyn CapabilityFactory) -> Result<Self> {
        if spec.members.is_empty() {
            return Err(TaskgraphError::Capability {
                name: spec.name.clone(),
                message: "team has no members".into(),
            });
        }

        let members = spec
            .members
            .iter()
            .map(|member| {
                Ok(Member {
                    spec: member.clone(),
                    agent: factory.create_agent(member)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: spec.name.clone(),
            mode: spec.mode,
            members,
        })
    }

    fn route(&self, task: &str) -> &Member {
        let mut best = &self.members[0];
        let mut best_score = best.match_score(task);
        for member in &self.members[1..] {
            let score = member.match_score(task);
            if score > best_score {
                best = member;
                best_score = score;
            }
        }
        best
    }

    async fn run_route(&self, task: String) -> Result<CapabilityOutput> {
        let member = self.route(&task);
        info!(team = %self.name, agent = %member.agent.name(), "Routing task to member");
        member.agent.run(task).await
    }

    async fn run_coordinate(&self, task: String) -> Result<CapabilityOutput> {
        let mut previous: Option<String> = None;
        for member in &self.members {
            let prompt = match previous {
                Some(ref prev) => format!(
                    "Previous agent output:\n---\n{}\n---\n\nYour task: {}",
                    prev, task
                ),
                None => task.clone(),
            };
            debug!(team = %self.name, agent = %member.agent.name(), "Relaying to member");
            let output = member.agent.run(prompt).await?;
            previous = Some(output.content);
        }
        Ok(CapabilityOutput::new(previous.unwrap_or_default()))
    }

    async fn run_collaborate(&self, task: String) -> Result<CapabilityOutput> {
        let futs: Vec<_> = self
            .members
            .iter()
            .map(|member| member.agent.run(task.clone()))
            .collect();
        let results = futures::future::join_all(futs).await;

        let mut sections = Vec::new();
        for (member, result) in self.members.iter().zip(results) {
            match result {
                Ok(output) => {
                    sections.push(format!("## {}\n{}", member.agent.name(), output.content))
                }
                Err(e) => {
                    warn!(
                        team = %self.name,
                        agent = %member.agent.name(),
                        error = %e,
                        "Team member failed"
                    );
                }
            }
        }

        if sections.is_empty() {
            return Err(TaskgraphError::Capability {
                name: self.name.clone(),
                message: "every team member failed".into(),
            });
        }
        Ok(CapabilityOutput::new(sections.join("\n\n")))
    }
}

impl TeamCapability for AgentTeam {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> TeamMode {
        self.mode
    }

    fn run(&self, task: String) -> BoxFuture<'_, Result<CapabilityOutput>> {
        Box::pin(async move {
            match self.mode {
                TeamMode::Route => self.run_route(task).await,
                TeamMode::Coordinate => self.run_coordinate(task).await,
                TeamMode::Collaborate => self.run_collaborate(task).await,
            }
        })
    }
}

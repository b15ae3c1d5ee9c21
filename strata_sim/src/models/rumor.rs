//! A rumor spreading over a shared network.
//!
//! Each person links to a neighbor on its own rank and to a random friend
//! on the next rank. Friends are pulled in as ghosts, the links become
//! complementary edges on the friend's owner, and every tick the owners
//! push fresh state so ghosts know who has heard the rumor.

use crate::context::SimContext;
use crate::error::SimError;
use crate::models::{Model, SimRuntime, StepReport};
use crate::world::SimConfig;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use strata_core::{
    Agent, AgentContent, AgentFactory, AgentId, AgentRequest, ContentProvider, DefaultEdgeManager,
    Edge, SharedNetwork,
};
use strata_env::{Rank, RunContext};
use tracing::debug;

/// Agent type tag of people.
pub const PERSON_TYPE: i32 = 1;

/// A person who may have heard the rumor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    id: AgentId,
    heard_at: Option<u64>,
}

impl Person {
    pub fn new(id: AgentId) -> Self {
        Self { id, heard_at: None }
    }

    pub fn informed(&self) -> bool {
        self.heard_at.is_some()
    }

    /// Tick the rumor reached this person.
    pub fn heard_at(&self) -> Option<u64> {
        self.heard_at
    }
}

impl Agent for Person {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn id_mut(&mut self) -> &mut AgentId {
        &mut self.id
    }
}

impl AgentContent for Person {
    fn agent_id(&self) -> AgentId {
        self.id
    }
}

/// Provider and factory for people.
pub struct PersonPackage;

impl ContentProvider<Person, Person> for PersonPackage {
    fn provide_content(&self, agent: &Person) -> Person {
        agent.clone()
    }
}

impl AgentFactory<Person, Person> for PersonPackage {
    fn create_agent(&self, content: &Person) -> Person {
        content.clone()
    }

    fn update_agent(&self, agent: &mut Person, content: &Person) {
        agent.heard_at = content.heard_at;
    }
}

/// One rank's share of the rumor network.
pub struct Rumor {
    network: SharedNetwork<()>,
    agents_per_rank: usize,
    spread_probability: f64,
}

impl Rumor {
    pub fn new(config: &SimConfig, rank: Rank) -> Self {
        Self {
            network: SharedNetwork::new("rumor", rank, false),
            agents_per_rank: config.agents_per_rank,
            spread_probability: 0.5,
        }
    }

    /// Chance per tick that an exposed person picks the rumor up.
    pub fn with_spread_probability(mut self, p: f64) -> Self {
        self.spread_probability = p.clamp(0.0, 1.0);
        self
    }

    pub fn network(&self) -> &SharedNetwork<()> {
        &self.network
    }

    fn person(&self, n: usize, rank: Rank) -> AgentId {
        AgentId::new(n as i32, rank, PERSON_TYPE)
    }
}

#[async_trait]
impl Model for Rumor {
    type Agent = Person;

    async fn setup(
        &mut self,
        rt: &mut SimRuntime<Person>,
        ctx: &SimContext,
    ) -> Result<(), SimError> {
        let me = ctx.rank();
        let size = rt.world_size();
        let count = self.agents_per_rank;
        for n in 0..count {
            let mut person = Person::new(self.person(n, me));
            if me == 0 && n == 0 {
                person.heard_at = Some(0);
            }
            rt.add_agent(person);
        }

        let mut rng = ctx.derive_rng(0);
        let mut links = Vec::new();
        let mut request = AgentRequest::new(me);
        let next = (me + 1) % size;
        // With two ranks the wrap-around links would duplicate the forward ones.
        if size > 2 || me < next {
            for n in 0..count {
                let friend = self.person(rng.gen_range(0..count), next);
                request.add_request(friend);
                links.push((self.person(n, me), friend));
            }
        }
        rt.request_agents(&request, &PersonPackage, &PersonPackage).await?;

        if count > 1 {
            for n in 0..count {
                links.push((self.person(n, me), self.person((n + 1) % count, me)));
            }
        }
        for (a, b) in links {
            self.network.add_edge(rt.agents_mut(), Edge::new(a, b, ()))?;
        }
        self.network
            .create_complementary_edges(rt, &PersonPackage, &PersonPackage, &DefaultEdgeManager)
            .await?;

        debug!(
            rank = me,
            edges = self.network.edge_count(),
            ghosts = rt.agents().ghost_count(),
            "rumor network built"
        );
        Ok(())
    }

    async fn step(
        &mut self,
        rt: &mut SimRuntime<Person>,
        ctx: &SimContext,
    ) -> Result<StepReport, SimError> {
        let tick = ctx.tick();
        let mut rng = ctx.derive_rng(tick);

        let mut reached = Vec::new();
        for person in rt.agents().local_agents().filter(|p| !p.informed()) {
            let exposed = self
                .network
                .adjacent(person.id())
                .iter()
                .any(|n| rt.agents().get(n).is_some_and(Person::informed));
            if exposed && rng.gen_bool(self.spread_probability) {
                reached.push(*person.id());
            }
        }
        for id in &reached {
            if let Some(person) = rt.agents_mut().get_mut(id) {
                person.heard_at = Some(tick);
            }
        }

        // Edge weight: informed endpoints, as seen by the edge's master.
        let weights: Vec<(AgentId, AgentId, f64)> = self
            .network
            .edges()
            .filter(|e| rt.agents().is_local(e.master()))
            .map(|e| {
                let informed = [e.source(), e.target()]
                    .iter()
                    .filter(|id| rt.agents().get(id).is_some_and(Person::informed))
                    .count();
                (*e.source(), *e.target(), informed as f64)
            })
            .collect();
        for (source, target, weight) in weights {
            if let Some(edge) = self.network.edge_mut(&source, &target) {
                edge.set_weight(weight);
            }
        }

        rt.sync_agent_status(&PersonPackage, &PersonPackage).await?;
        rt.sync_agents(&PersonPackage, &PersonPackage).await?;
        self.network.synch_edges(rt, &DefaultEdgeManager).await?;

        debug!(rank = ctx.rank(), tick, reached = reached.len(), "rumor step");
        Ok(StepReport {
            ghosts: rt.agents().ghost_count(),
            edges: self.network.edge_count(),
            informed: rt.agents().local_agents().filter(|p| p.informed()).count(),
            ..Default::default()
        })
    }

    fn digest(&self, person: &Person) -> i64 {
        person.heard_at.map(|t| t as i64).unwrap_or(-1)
    }
}

//! Scenario runner - drives a model on every rank and checks the result.

use crate::context::SimContext;
use crate::error::SimError;
use crate::models::{Model, Rumor, SimRuntime, StepReport, Wanderers};
use crate::oracle::{Oracle, RankSnapshot};
use crate::scenarios::ScenarioId;
use crate::world::{RankEnv, SimConfig, SimWorld};

use serde::Serialize;
use std::sync::Arc;
use strata_core::RuntimeContext;
use strata_env::{Rank, RunContext};
use tracing::{debug, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether every tick passed the oracle
    pub passed: bool,

    /// Ticks executed after setup
    pub total_ticks: u64,

    /// Local agents across all ranks at the end
    pub final_population: usize,

    /// First failure, if any
    pub failure_reason: Option<String>,

    /// Metrics collected during the run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScenarioMetrics {
    /// Agents that changed rank
    pub migrations: usize,

    /// Most ghosts held across all ranks at once
    pub peak_ghosts: usize,

    /// Edges held across all ranks at the end; cross-rank edges count twice
    pub final_edges: usize,

    /// Agents carrying the rumor at the end
    pub informed: usize,

    /// Oracle violations over the whole run
    pub violations: usize,
}

/// What one rank recorded: a snapshot and report for setup, then one per tick.
type RankTrace = Vec<(RankSnapshot, StepReport)>;

/// Runs scenarios.
pub struct ScenarioRunner {
    config: SimConfig,
}

impl ScenarioRunner {
    /// Creates a runner for `num_ranks` ranks; everything else defaults.
    pub fn new(seed: u64, num_ranks: usize) -> Self {
        Self {
            config: SimConfig {
                seed,
                num_ranks,
                ..Default::default()
            },
        }
    }

    pub fn from_config(config: SimConfig) -> Self {
        Self { config }
    }

    /// Sets the number of ticks.
    pub fn with_ticks(mut self, ticks: u64) -> Self {
        self.config.ticks = ticks;
        self
    }

    /// Sets how many agents each rank creates.
    pub fn with_agents_per_rank(mut self, agents: usize) -> Self {
        self.config.agents_per_rank = agents;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Runs a scenario on a fresh multi-threaded runtime.
    ///
    /// Must not be called from inside a tokio runtime; use `run_async`
    /// there.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => return self.failed(scenario, format!("cannot start runtime: {}", e)),
        };
        runtime.block_on(self.run_async(scenario))
    }

    /// Runs a scenario and returns the result.
    pub async fn run_async(&self, scenario: ScenarioId) -> ScenarioResult {
        info!(
            "Starting scenario: {} (seed={}, ranks={})",
            scenario.name(),
            self.config.seed,
            self.config.num_ranks
        );
        let traces = match scenario {
            ScenarioId::Wanderers => self.drive(Wanderers::new).await,
            ScenarioId::Rumor => {
                self.drive(|config, rank| Ok(Rumor::new(config, rank))).await
            }
        };
        match traces {
            Ok(traces) => self.evaluate(scenario, &traces),
            Err(e) => {
                warn!(scenario = scenario.name(), error = %e, "scenario aborted");
                self.failed(scenario, e.to_string())
            }
        }
    }

    async fn drive<M: Model>(
        &self,
        build: fn(&SimConfig, Rank) -> Result<M, SimError>,
    ) -> Result<Vec<RankTrace>, SimError> {
        let config = self.config.clone();
        SimWorld::new(config.clone())
            .run(move |env: RankEnv| {
                let config = config.clone();
                async move {
                    let RankEnv { comm, ctx } = env;
                    let mut model = build(&config, ctx.rank())?;
                    let mut rt = RuntimeContext::new(Arc::new(comm));
                    model.setup(&mut rt, &ctx).await?;

                    let mut trace = Vec::with_capacity(config.ticks as usize + 1);
                    trace.push((snapshot(&model, &rt, &ctx), StepReport::default()));
                    for _ in 0..config.ticks {
                        ctx.advance_tick();
                        let report = model.step(&mut rt, &ctx).await?;
                        trace.push((snapshot(&model, &rt, &ctx), report));
                    }
                    Ok(trace)
                }
            })
            .await
    }

    fn evaluate(&self, scenario: ScenarioId, traces: &[RankTrace]) -> ScenarioResult {
        let population = self.config.num_ranks * self.config.agents_per_rank;
        let oracle = Oracle::new().with_population(population);
        let steps = traces.iter().map(Vec::len).min().unwrap_or(0);

        let mut metrics = ScenarioMetrics::default();
        let mut failure_reason = None;
        let mut informed_before = 0;
        for t in 0..steps {
            let snapshots: Vec<RankSnapshot> =
                traces.iter().map(|trace| trace[t].0.clone()).collect();
            let violations = oracle.check(&snapshots);
            if let Some(first) = violations.first() {
                failure_reason.get_or_insert_with(|| first.to_string());
            }
            metrics.violations += violations.len();

            let reports = traces.iter().map(|trace| trace[t].1);
            let (mut ghosts, mut edges, mut informed) = (0, 0, 0);
            for report in reports {
                metrics.migrations += report.migrations;
                ghosts += report.ghosts;
                edges += report.edges;
                informed += report.informed;
            }
            metrics.peak_ghosts = metrics.peak_ghosts.max(ghosts);
            metrics.final_edges = edges;
            metrics.informed = informed;

            if scenario == ScenarioId::Rumor && t > 0 {
                if informed < informed_before {
                    failure_reason.get_or_insert_with(|| {
                        format!(
                            "tick {}: informed fell from {} to {}",
                            t, informed_before, informed
                        )
                    });
                }
                informed_before = informed;
            }
        }
        debug!(scenario = scenario.name(), ?metrics, "scenario evaluated");

        let final_population = traces
            .iter()
            .filter_map(|trace| trace.last())
            .map(|(snapshot, _)| snapshot.locals.len())
            .sum();
        let passed = failure_reason.is_none();
        if passed {
            info!("✅ {} PASSED ({} snapshots checked)", scenario.name(), steps);
        } else {
            warn!("❌ {} FAILED: {:?}", scenario.name(), failure_reason);
        }

        ScenarioResult {
            scenario,
            seed: self.config.seed,
            passed,
            total_ticks: steps.saturating_sub(1) as u64,
            final_population,
            failure_reason,
            metrics,
        }
    }

    fn failed(&self, scenario: ScenarioId, reason: String) -> ScenarioResult {
        ScenarioResult {
            scenario,
            seed: self.config.seed,
            passed: false,
            total_ticks: 0,
            final_population: 0,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
        }
    }
}

fn snapshot<M: Model>(model: &M, rt: &SimRuntime<M::Agent>, ctx: &SimContext) -> RankSnapshot {
    RankSnapshot::capture(ctx.tick(), rt.agents(), |a| model.digest(a))
}

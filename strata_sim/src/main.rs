//! Strata simulator CLI
//!
//! Runs the built-in scenarios over one or more seeds and reports whether
//! every tick kept the distributed registries consistent.

use clap::Parser;
use std::path::PathBuf;
use strata_sim::scenarios::ScenarioId;
use strata_sim::{ScenarioResult, ScenarioRunner, SimConfig};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "strata-sim")]
#[command(about = "Multi-rank agent simulation with consistency checks")]
struct Args {
    /// Master seed for determinism (0 = random from time) [default: 42]
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of ranks [default: 4]
    #[arg(short, long)]
    ranks: Option<usize>,

    /// Scenario to run (wanderers, rumor, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Ticks to simulate
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Agents created on every rank
    #[arg(short, long)]
    agents: Option<usize>,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// JSON config file; command line flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let default = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error: cannot install logger: {}", e);
        std::process::exit(1);
    }

    let mut config = match &args.config {
        Some(path) => SimConfig::from_json_file(path).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }),
        None => SimConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(ranks) = args.ranks {
        config.num_ranks = ranks;
    }
    if let Some(ticks) = args.ticks {
        config.ticks = ticks;
    }
    if let Some(agents) = args.agents {
        config.agents_per_rank = agents;
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if !args.json {
        info!("Strata simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!("Available scenarios: wanderers, rumor, all");
            std::process::exit(1);
        })]
    };

    let base_seed = if config.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        config.seed
    };

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let runner = ScenarioRunner::from_config(SimConfig {
            seed: base_seed.wrapping_add(seed_offset as u64),
            ..config.clone()
        });

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                if result.passed {
                    info!(
                        "✓ {} (seed={}) PASSED: {} migrations, peak {} ghosts",
                        scenario.name(),
                        result.seed,
                        result.metrics.migrations,
                        result.metrics.peak_ghosts
                    );
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed,
            "failed": failed,
            "results": all_results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Error: {}", e),
        }
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("Results: {}/{} passed", total - failed, total);
    }

    if failed > 0 {
        std::process::exit(1);
    }
}

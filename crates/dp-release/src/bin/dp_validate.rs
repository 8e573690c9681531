//! DP Validate CLI Tool
//!
//! Validate statistic batches and inspect privacy budgets from JSON files.
//!
//! Usage:
//!   dp-validate validate --fixture <json> --plan <id> --user <id> --requests <json> [--config <json>]
//!   dp-validate redistribute --max-epsilon <f> --specs <json>
//!   dp-validate bins --min <n> --max <n> --bins <n>
//!   dp-validate available --fixture <json> --dataset <id>
//!
//! Logging goes to stderr and follows `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use dp_release::memory::InMemoryStore;
use dp_release::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dp-validate")]
#[command(version = "0.1.0")]
#[command(about = "Validate differentially private statistic releases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print compact JSON instead of pretty JSON
    #[arg(long, global = true)]
    compact: bool,

    /// Output file (stdout if not specified)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a batch of statistic requests for a plan
    Validate {
        /// Fixture with datasets, plans, variables and users
        #[arg(short, long)]
        fixture: PathBuf,

        /// Plan the batch belongs to
        #[arg(short, long)]
        plan: String,

        /// Acting user id
        #[arg(short, long)]
        user: String,

        /// JSON array of statistic requests
        #[arg(short, long)]
        requests: PathBuf,

        /// Validation config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Take rejected requests back out of the running epsilon total
        #[arg(long)]
        exclude_rejected: bool,

        /// Input distance the chains must be private for
        #[arg(long)]
        input_distance: Option<u32>,
    },

    /// Split a budget evenly across the unlocked statistics of a list
    Redistribute {
        /// Budget to split
        #[arg(short, long)]
        max_epsilon: f64,

        /// JSON array of statistic requests
        #[arg(short, long)]
        specs: PathBuf,
    },

    /// Show the edges and buckets for an equal-ranges histogram
    Bins {
        #[arg(long, allow_negative_numbers = true)]
        min: f64,

        #[arg(long, allow_negative_numbers = true)]
        max: f64,

        /// Requested number of bins
        #[arg(short, long)]
        bins: usize,
    },

    /// Show the epsilon a dataset has left
    Available {
        /// Fixture with datasets and plans
        #[arg(short, long)]
        fixture: PathBuf,

        /// Dataset id
        #[arg(short, long)]
        dataset: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: serde_json::Value = match cli.command {
        Commands::Validate {
            fixture,
            plan,
            user,
            requests,
            config,
            exclude_rejected,
            input_distance,
        } => {
            let store = InMemoryStore::from_file(&fixture)?;
            let requests: Vec<StatisticRequest> = load_json(&requests)?;

            let mut config = match config {
                Some(path) => ValidationConfig::from_file(path)?,
                None => ValidationConfig::default(),
            };
            if exclude_rejected {
                config.overflow_policy = BudgetOverflowPolicy::ExcludeRejected;
            }
            if let Some(d_in) = input_distance {
                config.input_distance = d_in;
            }
            config.validate()?;

            let library = ReferenceLibrary::new();
            let validator = ReleaseValidator::new(&store.catalog, &store.datasets, &store.plans, &library)
                .with_config(config);
            let results = validator.validate_batch(&plan, &store.principal(&user), &requests)?;
            serde_json::to_value(results)?
        }
        Commands::Redistribute { max_epsilon, specs } => {
            let specs: Vec<StatisticRequest> = load_json(&specs)?;
            match redistribute_epsilon(max_epsilon, specs) {
                Ok(specs) => serde_json::json!({ "success": true, "specs": specs }),
                Err(e) => serde_json::json!({ "success": false, "error": e.to_string() }),
            }
        }
        Commands::Bins { min, max, bins } => {
            let edges = BinEdges::new(min, max, bins)?;
            serde_json::json!({
                "edges": edges.edges(),
                "inclusive_buckets": edges.inclusive_buckets(),
                "exclusive_buckets": edges.exclusive_buckets(),
            })
        }
        Commands::Available { fixture, dataset } => {
            let store = InMemoryStore::from_file(&fixture)?;
            let available = BudgetLedger::new().available(&store.datasets, &store.plans, &dataset)?;
            serde_json::json!({ "dataset_id": dataset, "available_epsilon": available })
        }
    };

    let output_str = if cli.compact {
        serde_json::to_string(&result)?
    } else {
        serde_json::to_string_pretty(&result)?
    };

    if let Some(output_path) = cli.output {
        fs::write(&output_path, &output_str)?;
        eprintln!("Output written to: {}", output_path.display());
    } else {
        println!("{}", output_str);
    }

    Ok(())
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    Ok(serde_json::from_str(&content)?)
}

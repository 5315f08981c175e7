use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use walkhex::{IsochroneRequest, RunConfig, RunError};
use walkhex_core::loading::GraphBuilderConfig;
use walkhex_core::model::Weight;

/// Pedestrian accessibility to amenities over street networks and hex grids
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Default log level, overridden by RUST_LOG
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline for every city of a TOML configuration
    Run {
        config: PathBuf,
        /// Overrides the run id of the configuration
        #[arg(long)]
        run_id: Option<String>,
        /// Split origins into this many parallel shards
        #[arg(long)]
        shards: Option<usize>,
    },
    /// Walking isochrones from a set of street nodes, written as GeoJSON
    Isochrones {
        #[arg(long)]
        nodes: PathBuf,
        #[arg(long)]
        edges: PathBuf,
        /// Comma-separated OSM node ids
        #[arg(long, value_delimiter = ',', required = true)]
        origins: Vec<i64>,
        /// Meters, or minutes with `--weight time_min`
        #[arg(long)]
        budget: f64,
        #[arg(long, default_value = "length", value_parser = parse_weight)]
        weight: Weight,
        #[arg(long, default_value_t = 10)]
        resolution: u8,
        #[arg(long)]
        output: PathBuf,
    },
}

fn parse_weight(value: &str) -> Result<Weight, String> {
    match value {
        "length" => Ok(Weight::Length),
        "time_min" => Ok(Weight::TimeMin),
        other => Err(format!("unknown weight '{other}', expected length or time_min")),
    }
}

fn execute(command: Commands) -> Result<(), RunError> {
    match command {
        Commands::Run {
            config,
            run_id,
            shards,
        } => {
            let mut config = RunConfig::from_file(&config)?;
            if run_id.is_some() {
                config.run_id = run_id;
                config.validate()?;
            }
            if shards.is_some() {
                config.analysis.shards = shards;
            }
            let summary = walkhex::run(&config)?;
            for outcome in &summary.completed {
                info!(
                    city = %outcome.city,
                    nodes = outcome.nodes,
                    orphans = outcome.orphans,
                    failed_categories = ?outcome.failed_categories,
                    "Completed"
                );
            }
            for (city, e) in &summary.failed {
                error!(city = %city, error = %e, "Failed");
            }
            if summary.completed.is_empty() {
                return Err(RunError::Config("every city failed".to_string()));
            }
            Ok(())
        }
        Commands::Isochrones {
            nodes,
            edges,
            origins,
            budget,
            weight,
            resolution,
            output,
        } => {
            let request = IsochroneRequest {
                nodes,
                edges,
                graph: GraphBuilderConfig::default(),
                origins,
                budget,
                weight,
                resolution,
                output,
            };
            let done = walkhex::isochrones(&request)?;
            info!(done, output = %request.output.display(), "Isochrones written");
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting walkhex v{}", env!("CARGO_PKG_VERSION"));
    match execute(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the taxi demand pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use taxi_demand_pipeline::config::{PipelineConfig, SourceMode};
use taxi_demand_pipeline::consumer::Consumer;
use taxi_demand_pipeline::driver::Pipeline;
use taxi_demand_pipeline::health::run_health_check;
use taxi_demand_stream::StreamBuffers;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "taxi_demand", about = "Real-time taxi demand pipeline")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Record source (overrides `TAXI_DEMAND_SOURCE` env var)
    #[arg(long, global = true)]
    source: Option<SourceMode>,

    /// Live page size or synthetic batch size
    #[arg(long, global = true)]
    limit: Option<u64>,

    /// Seed for the synthetic generator
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline and console dashboard until Ctrl-C
    Run {
        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,
        /// Run the pipeline without the console dashboard
        #[arg(long)]
        headless: bool,
    },
    /// Check every pipeline component against a synthetic sample
    Health,
    /// Run one tick and print the buffers as JSON lines
    View,
    /// Print the effective configuration
    Config,
}

impl Cli {
    fn load_config(&self) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
        let mut config = PipelineConfig::load(self.config.as_deref())?;
        if let Some(mode) = self.source {
            config.source.mode = mode;
        }
        if let Some(limit) = self.limit {
            config.source.limit = limit;
            config.source.batch_size = usize::try_from(limit)?;
        }
        if self.seed.is_some() {
            config.source.seed = self.seed;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    let config = Arc::new(cli.load_config()?);

    match cli.command.unwrap_or(Commands::Run {
        duration_secs: None,
        headless: false,
    }) {
        Commands::Run {
            duration_secs,
            headless,
        } => run(config, duration_secs, headless).await?,
        Commands::Health => {
            let report = run_health_check(&config, Utc::now());
            println!("{report}");
            if !report.passed() {
                return Err("health check failed".into());
            }
        }
        Commands::View => {
            let buffers = Arc::new(StreamBuffers::new(
                config.buffers.demand,
                config.buffers.anomalies,
            ));
            let mut pipeline = Pipeline::from_config(Arc::clone(&config), Arc::clone(&buffers))?;
            let summary = pipeline.tick(Utc::now()).await?;
            log::info!(
                "Viewing {} trips over {} locations",
                summary.trips,
                summary.locations
            );
            for aggregate in buffers.recent_demand(config.consumer.demand_rows) {
                println!("{}", serde_json::to_string(&aggregate)?);
            }
            for event in buffers.recent_anomalies(config.consumer.anomaly_rows) {
                println!("{}", serde_json::to_string(&event)?);
            }
            for point in buffers.forecasts() {
                println!("{}", serde_json::to_string(&point)?);
            }
            println!("{}", serde_json::to_string(&buffers.stats())?);
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

async fn run(
    config: Arc<PipelineConfig>,
    duration_secs: Option<u64>,
    headless: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let buffers = Arc::new(StreamBuffers::new(
        config.buffers.demand,
        config.buffers.anomalies,
    ));
    let pipeline = Pipeline::from_config(Arc::clone(&config), Arc::clone(&buffers))?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    log::info!("Starting taxi demand pipeline ({} source)", config.source.mode);
    let driver = tokio::spawn(pipeline.run(shutdown_rx.clone()));
    let consumer = (!headless)
        .then(|| tokio::spawn(Consumer::new(buffers, config.consumer).run(shutdown_rx)));

    match duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => log::info!("Interrupted"),
                () = tokio::time::sleep(Duration::from_secs(secs)) => {
                    log::info!("Run duration of {secs}s elapsed");
                }
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            log::info!("Interrupted");
        }
    }

    log::info!("Shutting down...");
    shutdown_tx.send_replace(true);
    driver.await?;
    if let Some(consumer) = consumer {
        consumer.await?;
    }
    log::info!("Shutdown complete");
    Ok(())
}

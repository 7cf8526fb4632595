//! Snap revision harvester CLI

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use snap_revision_harvester::{run_harvest, HarvestConfig};

#[derive(Parser)]
#[command(name = "snap-revision-harvester")]
#[command(about = "Record version and architecture of every snap revision", long_about = None)]
struct Cli {
    /// YAML or JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Snap to harvest
    #[arg(long)]
    snap: Option<String>,

    /// Concurrent workers (default: number of CPUs)
    #[arg(short, long)]
    workers: Option<usize>,

    /// CSV destination
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write failed revisions as JSON
    #[arg(long)]
    failures_output: Option<PathBuf>,

    /// Per-revision timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Keep per-revision scratch directories
    #[arg(long)]
    keep_workspaces: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn into_config(self) -> Result<HarvestConfig> {
        let mut config = match &self.config {
            Some(path) => HarvestConfig::from_file(path)?,
            None => HarvestConfig::default(),
        };

        if let Some(snap) = self.snap {
            config.package = snap;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if self.failures_output.is_some() {
            config.failures_output = self.failures_output;
        }
        if self.timeout.is_some() {
            config.revision_timeout_secs = self.timeout;
        }
        if self.keep_workspaces {
            config.keep_workspaces = true;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let print_config = cli.print_config;
    let config = cli.into_config()?;

    if print_config {
        config.validate()?;
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    let report = run_harvest(&config).await?;

    println!("\n=== Harvest Summary ===");
    println!("Package:          {}", report.package);
    println!("Current revision: {}", report.current_revision);
    println!("Processed:        {}", report.stats.processed);
    println!("Succeeded:        {}", report.stats.succeeded);
    println!("Failed:           {}", report.stats.failed);
    println!("Duration:         {} ms", report.stats.total_duration_ms);
    println!("Results saved to {}", config.output.display());

    Ok(())
}

use bankflow::application::pipeline::Pipeline;
use bankflow::config::SimulationConfig;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file. Missing keys take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run duration in seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Client transfers per second (0 disables the client emitter)
    #[arg(long)]
    client_tps: Option<f64>,

    /// Print the final report as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Also write every pipeline event to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_layer = match &cli.log_file {
        Some(path) => {
            let file = File::create(path).into_diagnostic()?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    let mut config = match &cli.config {
        Some(path) => SimulationConfig::from_json_file(path).into_diagnostic()?,
        None => SimulationConfig::default(),
    };
    if let Some(duration) = cli.duration {
        config.run_duration_secs = duration;
    }
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    if let Some(tps) = cli.client_tps {
        config.client_tps = tps;
    }

    let pipeline = Pipeline::new(config).into_diagnostic()?;

    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, draining");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    let mut report = pipeline.run().await.into_diagnostic()?;
    report.log_file = cli.log_file;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
    } else {
        println!("{report}");
    }

    Ok(())
}

//! Service binary: loads configuration, initializes telemetry, and runs the
//! ingest-to-flush pipeline until shutdown.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use silt_config::shared::Config;
use tracing::{error, info};

use crate::error::{SinkError, SinkResult};

mod core;
mod error;

#[derive(Debug, Parser)]
#[command(name = "silt-sink", about = "Stream CDC events into a warehouse")]
struct Args {
    /// Path to the YAML/JSON configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Tracing may not be installed yet (config errors happen first).
            eprintln!("{err}");
            error!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(args: Args) -> SinkResult<()> {
    let config: Config = silt_config::load_config(&args.config)
        .map_err(|err| SinkError::Config(err.to_string()))?;

    silt_telemetry::tracing::init_tracing(env!("CARGO_BIN_NAME"), args.json_logs)
        .map_err(|err| SinkError::Config(err.to_string()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| SinkError::Config(err.to_string()))?;

    runtime.block_on(async {
        silt_telemetry::metrics::init_metrics()
            .map_err(|err| SinkError::Config(err.to_string()))?;

        info!(
            output = config.output_source.label(),
            flush_interval_seconds = config.flush_interval_seconds,
            buffer_rows = config.buffer_rows,
            "starting sink"
        );

        core::run(config).await
    })
}

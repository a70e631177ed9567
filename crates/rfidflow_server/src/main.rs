//! RFID Flow server
//!
//! Usage:
//!     rfidflow-server --config rfidflow.toml --bind 0.0.0.0:8000

use clap::Parser;
use rfidflow_logging::{init_logging, LogConfig};
use rfidflow_server::ServeArgs;

#[derive(Parser, Debug)]
#[command(name = "rfidflow-server", about = "RFID Flow ingestion server", version)]
struct Args {
    #[command(flatten)]
    serve: ServeArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.serve.resolve()?;

    let _log_guard = init_logging(LogConfig {
        app_name: "rfidflow-server",
        filter: config.logging.filter.as_deref(),
        log_dir: config.log_dir(),
        quiet: false,
    })?;

    tracing::info!("Starting RFID Flow server");
    rfidflow_server::serve(config).await
}

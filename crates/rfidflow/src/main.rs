//! RFID Flow command line
//!
//! One binary for the ingestion server, cylinder administration against the
//! database, the scan listener and the load simulator.

use anyhow::Result;
use clap::{Parser, Subcommand};
use rfidflow_db::RfidFlowDb;
use rfidflow_logging::{init_logging, LogConfig};
use rfidflow_server::ServeArgs;
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

use cli::asset::AssetAction;
use cli::ingest::IngestArgs;
use cli::listen::ListenArgs;
use cli::simulate::SimulateArgs;
use cli::stats::RequalAction;

#[derive(Parser, Debug)]
#[command(name = "rfidflow", about = "RFID gas cylinder tracking", version)]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.rfidflow/rfidflow.toml when present)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path, overrides [database] path
    #[arg(long, global = true, env = "RFIDFLOW_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP ingestion server
    Serve {
        /// Listen address, overrides [server] bind
        #[arg(long, env = "RFIDFLOW_BIND")]
        bind: Option<String>,

        /// Shared token for /api routes, overrides [server] ingest_token
        #[arg(long, env = "RFIDFLOW_INGEST_TOKEN", hide_env_values = true)]
        ingest_token: Option<String>,
    },

    /// Record a reading directly in the database
    Ingest(IngestArgs),

    /// Manage cylinders
    Asset {
        #[command(subcommand)]
        action: AssetAction,
    },

    /// Show audit entries
    Audit {
        /// Only this cylinder
        tag: Option<String>,

        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Dashboard statistics
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Requalification maintenance
    Requal {
        #[command(subcommand)]
        action: RequalAction,
    },

    /// Move a cylinder to its next distributor without recording a reading
    Advance {
        tag: String,

        #[arg(long)]
        actor: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Forward scanned codes from stdin to a running server
    Listen(ListenArgs),

    /// Post synthetic readings to a running server
    Simulate(SimulateArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let (bind, ingest_token) = match &cli.command {
        Commands::Serve { bind, ingest_token } => (bind.clone(), ingest_token.clone()),
        _ => (None, None),
    };
    let config = ServeArgs {
        config: cli.config.clone(),
        database: cli.database.clone(),
        bind,
        ingest_token,
    }
    .resolve()?;

    let serving = matches!(cli.command, Commands::Serve { .. });
    let _log_guard = init_logging(LogConfig {
        app_name: "rfidflow",
        filter: config.logging.filter.as_deref(),
        log_dir: if serving { config.log_dir() } else { None },
        quiet: !serving && !cli.verbose,
    })?;

    match cli.command {
        Commands::Serve { .. } => rfidflow_server::serve(config).await,
        Commands::Listen(args) => cli::listen::run(args).await,
        Commands::Simulate(args) => cli::simulate::run(args).await,
        command => {
            let db = cli::context::open_db(&config).await?;
            let result = run_db_command(&db, command).await;
            db.close().await;
            result
        }
    }
}

async fn run_db_command(db: &RfidFlowDb, command: Commands) -> Result<()> {
    match command {
        Commands::Ingest(args) => cli::ingest::run(db, args).await,
        Commands::Asset { action } => cli::asset::run(db, action).await,
        Commands::Audit { tag, limit, json } => cli::audit::run(db, tag.as_deref(), limit, json).await,
        Commands::Stats { json } => cli::stats::run(db, json).await,
        Commands::Requal { action } => cli::stats::run_requal(db, action).await,
        Commands::Advance { tag, actor, json } => {
            cli::asset::run_advance(db, &tag, actor.as_deref(), json).await
        }
        Commands::Serve { .. } | Commands::Listen(_) | Commands::Simulate(_) => {
            anyhow::bail!("command does not run against the database")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_asset_edit_clears_field() {
        let cli = Cli::try_parse_from(["rfidflow", "asset", "edit", "E200", "--serial", ""]).unwrap();
        match cli.command {
            Commands::Asset {
                action: AssetAction::Edit { serial, .. },
            } => assert_eq!(serial.as_deref(), Some("")),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_asset_create_identification() {
        let cli = Cli::try_parse_from([
            "rfidflow", "asset", "create", "E200", "--capacity", "13", "--year", "2019",
            "--customer", "Padaria Central",
        ])
        .unwrap();
        match cli.command {
            Commands::Asset {
                action: AssetAction::Create { capacity, year, customer, location, .. },
            } => {
                assert_eq!(capacity, Some(13.0));
                assert_eq!(year, Some(2019));
                assert_eq!(customer.as_deref(), Some("Padaria Central"));
                assert_eq!(location, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_ingest_negative_rssi() {
        let cli = Cli::try_parse_from(["rfidflow", "ingest", "E200", "--rssi", "-61", "--source", "rfid"])
            .unwrap();
        match cli.command {
            Commands::Ingest(args) => {
                assert_eq!(args.rssi, Some(-61));
                assert_eq!(args.source, rfidflow_db::ReadingSource::Rfid);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}

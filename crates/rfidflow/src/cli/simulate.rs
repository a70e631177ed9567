//! Simulate command - load a running server with synthetic readings

use anyhow::Result;
use rfidflow::simulator::{self, SimulationPlan};
use rfidflow::IngestClient;
use std::time::Duration;

#[derive(Debug, Clone, clap::Args)]
pub struct SimulateArgs {
    /// Server base URL
    #[arg(long, env = "RFIDFLOW_SERVER", default_value = rfidflow_protocol::defaults::DEFAULT_SERVER_URL)]
    pub server: String,

    /// Shared token for /api routes
    #[arg(long, env = "RFIDFLOW_INGEST_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Number of readings to post
    #[arg(short = 'n', long, default_value = "100")]
    pub readings: usize,

    /// Number of distinct tags
    #[arg(long, default_value = "20")]
    pub tags: usize,

    /// Requests in flight at once
    #[arg(short = 'j', long, default_value = "8")]
    pub concurrency: usize,

    /// Pause before each request in milliseconds
    #[arg(long, default_value = "0")]
    pub delay_ms: u64,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

pub async fn run(args: SimulateArgs) -> Result<()> {
    let client = IngestClient::new(&args.server, args.token)?;
    let health = client.health().await?;
    println!(
        "Simulating {} readings over {} tags against {} (server {})",
        args.readings,
        args.tags,
        client.base_url(),
        health.version
    );

    let plan = SimulationPlan {
        readings: args.readings,
        tags: args.tags,
        concurrency: args.concurrency,
        delay: Duration::from_millis(args.delay_ms),
        progress: !args.no_progress,
    };
    let summary = simulator::run(&client, &plan).await?;

    println!();
    println!("Succeeded:    {}", summary.succeeded);
    println!("Failed:       {}", summary.failed);
    println!("New tags:     {}", summary.created);
    println!("Success rate: {:.1}%", summary.success_rate());
    println!("Elapsed:      {:.1}s", summary.elapsed.as_secs_f64());
    println!("Throughput:   {:.2} readings/s", summary.per_second());

    if summary.failed > 0 {
        anyhow::bail!("{} reading(s) failed", summary.failed);
    }
    Ok(())
}

//! Listen command - forward codes from a scanner on stdin to the server

use anyhow::Result;
use rfidflow::{IngestClient, LineSource, Listener, ListenerSettings};
use std::time::Duration;

#[derive(Debug, Clone, clap::Args)]
pub struct ListenArgs {
    /// Server base URL
    #[arg(long, env = "RFIDFLOW_SERVER", default_value = rfidflow_protocol::defaults::DEFAULT_SERVER_URL)]
    pub server: String,

    /// Shared token for /api routes
    #[arg(long, env = "RFIDFLOW_INGEST_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Treat each line as a poll of the scanner display: a code is sent once
    /// two consecutive samples agree
    #[arg(long)]
    pub polled: bool,

    /// Consecutive identical samples needed before a code is sent
    #[arg(long)]
    pub stable_samples: Option<usize>,

    /// Samples examined per read attempt
    #[arg(long)]
    pub max_samples: Option<usize>,

    /// Pause between samples in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

impl ListenArgs {
    pub fn settings(&self) -> ListenerSettings {
        let base = if self.polled {
            ListenerSettings::polled()
        } else {
            ListenerSettings::default()
        };
        ListenerSettings {
            stable_samples: self.stable_samples.unwrap_or(base.stable_samples),
            max_samples: self.max_samples.unwrap_or(base.max_samples),
            sample_interval: self
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(base.sample_interval),
        }
    }
}

pub async fn run(args: ListenArgs) -> Result<()> {
    let settings = args.settings();
    let client = IngestClient::new(&args.server, args.token)?;

    eprintln!("Listening for codes on stdin, sending to {}", client.base_url());
    let mut listener = Listener::new(LineSource::stdin(), client, settings);
    let stats = listener.run().await?;

    println!(
        "Sent {}, repeats suppressed {}, unstable {}, failed {}",
        stats.sent, stats.repeats_suppressed, stats.unstable, stats.failed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        listen: ListenArgs,
    }

    fn parse(args: &[&str]) -> ListenerSettings {
        let mut argv = vec!["listen"];
        argv.extend_from_slice(args);
        Harness::try_parse_from(argv).unwrap().listen.settings()
    }

    #[test]
    fn test_line_scans_need_one_sample_by_default() {
        let settings = parse(&[]);
        assert_eq!(settings.stable_samples, 1);
        assert_eq!(settings.max_samples, 1);
    }

    #[test]
    fn test_polled_preset_and_overrides() {
        let settings = parse(&["--polled"]);
        assert_eq!(settings.stable_samples, 2);
        assert_eq!(settings.max_samples, 4);
        assert_eq!(settings.sample_interval, Duration::from_millis(100));

        let settings = parse(&["--polled", "--interval-ms", "0", "--max-samples", "6"]);
        assert_eq!(settings.max_samples, 6);
        assert!(settings.sample_interval.is_zero());
    }
}

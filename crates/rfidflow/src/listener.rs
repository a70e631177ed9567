//! Scan listener: forwards codes from a scanner to the barcode endpoint.
//!
//! A code is sent once it reads the same on `stable_samples` consecutive
//! samples, and only when it differs from the last code this listener sent.
//! Event sources (one line per scan) need a single sample; sources that poll
//! a scanner display use [`ListenerSettings::polled`].

use anyhow::Result;
use rfidflow_protocol::BarcodeReply;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::{debug, info, warn};

use crate::client::IngestClient;

/// One observation of the scanner display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sample {
    Code(String),
    Empty,
    /// The source has no more samples
    Closed,
}

/// Where samples come from.
#[allow(async_fn_in_trait)]
pub trait ScanSource {
    async fn sample(&mut self) -> Result<Sample>;
}

/// Where stable codes go.
#[allow(async_fn_in_trait)]
pub trait CodeSink {
    async fn send(&mut self, code: &str) -> Result<BarcodeReply>;
}

/// Line-oriented source: one sample per line (keyboard-wedge scanner, pipe, stdin).
pub struct LineSource<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

impl LineSource<tokio::io::BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> ScanSource for LineSource<R> {
    async fn sample(&mut self) -> Result<Sample> {
        Ok(match self.lines.next_line().await? {
            None => Sample::Closed,
            Some(line) => match line.trim() {
                "" => Sample::Empty,
                code => Sample::Code(code.to_string()),
            },
        })
    }
}

impl CodeSink for IngestClient {
    async fn send(&mut self, code: &str) -> Result<BarcodeReply> {
        Ok(self.register_barcode(code).await?.body)
    }
}

#[derive(Debug, Clone)]
pub struct ListenerSettings {
    /// Samples that must agree before a code counts as read
    pub stable_samples: usize,
    /// Samples examined per read attempt
    pub max_samples: usize,
    /// Pause between samples
    pub sample_interval: Duration,
}

impl ListenerSettings {
    /// Settings for a source that re-reads a display: a code counts once two
    /// consecutive samples agree, within four samples 100 ms apart.
    pub fn polled() -> Self {
        Self {
            stable_samples: 2,
            max_samples: 4,
            sample_interval: Duration::from_millis(100),
        }
    }
}

impl Default for ListenerSettings {
    /// Every sample is a complete scan.
    fn default() -> Self {
        Self {
            stable_samples: 1,
            max_samples: 1,
            sample_interval: Duration::ZERO,
        }
    }
}

/// Totals for one listener run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub sent: u64,
    pub repeats_suppressed: u64,
    pub unstable: u64,
    pub failed: u64,
}

enum Read {
    Stable(String),
    Unstable,
    /// Only blank samples
    Idle,
    Closed,
}

pub struct Listener<S, K> {
    source: S,
    sink: K,
    settings: ListenerSettings,
    last_sent: Option<String>,
    stats: ListenerStats,
}

impl<S: ScanSource, K: CodeSink> Listener<S, K> {
    pub fn new(source: S, sink: K, settings: ListenerSettings) -> Self {
        Self {
            source,
            sink,
            settings,
            last_sent: None,
            stats: ListenerStats::default(),
        }
    }

    pub fn last_sent(&self) -> Option<&str> {
        self.last_sent.as_deref()
    }

    pub fn stats(&self) -> ListenerStats {
        self.stats
    }

    /// Run until the source closes.
    pub async fn run(&mut self) -> Result<ListenerStats> {
        info!("Scan listener started");
        loop {
            match self.read_stable().await? {
                Read::Closed => break,
                Read::Unstable => self.stats.unstable += 1,
                Read::Idle => {}
                Read::Stable(code) => self.forward(code).await,
            }
        }
        info!(sent = self.stats.sent, "Scan listener stopped");
        Ok(self.stats)
    }

    async fn forward(&mut self, code: String) {
        if self.last_sent.as_deref() == Some(code.as_str()) {
            debug!(code = %code, "Repeat of last sent code");
            self.stats.repeats_suppressed += 1;
            return;
        }
        self.last_sent = Some(code.clone());

        match self.sink.send(&code).await {
            Ok(BarcodeReply::Registered(reply)) => {
                info!(code = %reply.codigo, created = reply.criado_novo, reading_id = reply.id_leitura, "Code sent");
                self.stats.sent += 1;
            }
            Ok(BarcodeReply::Failed(reply)) => {
                warn!(code = %code, error = %reply.error, "Server rejected code");
                self.stats.failed += 1;
            }
            Err(err) => {
                warn!(code = %code, error = %err, "Failed to send code");
                self.stats.failed += 1;
            }
        }
    }

    async fn read_stable(&mut self) -> Result<Read> {
        let needed = self.settings.stable_samples.max(1);
        let mut candidate: Option<String> = None;
        let mut streak = 0;
        let mut saw_code = false;

        for i in 0..self.settings.max_samples.max(needed) {
            if i > 0 && !self.settings.sample_interval.is_zero() {
                tokio::time::sleep(self.settings.sample_interval).await;
            }
            match self.source.sample().await? {
                Sample::Closed => {
                    if saw_code {
                        self.stats.unstable += 1;
                    }
                    return Ok(Read::Closed);
                }
                Sample::Empty => {
                    candidate = None;
                    streak = 0;
                }
                Sample::Code(code) => {
                    saw_code = true;
                    if candidate.as_deref() == Some(code.as_str()) {
                        streak += 1;
                    } else {
                        candidate = Some(code);
                        streak = 1;
                    }
                    if streak >= needed {
                        return Ok(Read::Stable(candidate.take().unwrap_or_default()));
                    }
                }
            }
        }
        Ok(if saw_code { Read::Unstable } else { Read::Idle })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfidflow_protocol::{BarcodeResponse, ErrorResponse};

    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<String>,
        reject: Option<String>,
    }

    impl CodeSink for RecordingSink {
        async fn send(&mut self, code: &str) -> Result<BarcodeReply> {
            self.sent.push(code.to_string());
            if self.reject.as_deref() == Some(code) {
                return Ok(BarcodeReply::Failed(ErrorResponse::new("Barcode vazio")));
            }
            Ok(BarcodeReply::Registered(BarcodeResponse {
                success: true,
                codigo: code.to_string(),
                criado_novo: false,
                id_leitura: self.sent.len() as i64,
                data_hora: "01/01/2024 00:00:00".into(),
            }))
        }
    }

    fn polled() -> ListenerSettings {
        ListenerSettings {
            sample_interval: Duration::ZERO,
            ..ListenerSettings::polled()
        }
    }

    fn listener(input: &'static str) -> Listener<LineSource<&'static [u8]>, RecordingSink> {
        Listener::new(
            LineSource::new(input.as_bytes()),
            RecordingSink::default(),
            polled(),
        )
    }

    #[tokio::test]
    async fn test_default_settings_send_every_distinct_scan() {
        let mut l = Listener::new(
            LineSource::new("7891000100103\nE2001234\n7891000055120\n".as_bytes()),
            RecordingSink::default(),
            ListenerSettings::default(),
        );
        let stats = l.run().await.unwrap();
        assert_eq!(l.sink.sent, vec!["7891000100103", "E2001234", "7891000055120"]);
        assert_eq!(stats.sent, 3);
        assert_eq!(stats.unstable, 0);
    }

    #[tokio::test]
    async fn test_default_settings_suppress_back_to_back_repeats() {
        let mut l = Listener::new(
            LineSource::new("A\nA\n\nB\nA\n".as_bytes()),
            RecordingSink::default(),
            ListenerSettings::default(),
        );
        let stats = l.run().await.unwrap();
        assert_eq!(l.sink.sent, vec!["A", "B", "A"]);
        assert_eq!(stats.repeats_suppressed, 1);
        assert_eq!(stats.unstable, 0);
    }

    #[tokio::test]
    async fn test_window_cut_short_by_end_of_input_counts_as_unstable() {
        let mut l = listener("A\nA\nB\n");
        let stats = l.run().await.unwrap();
        assert_eq!(l.sink.sent, vec!["A"]);
        assert_eq!(stats.unstable, 1);
    }

    #[tokio::test]
    async fn test_sends_stable_codes_once() {
        let mut l = listener("A\nA\nA\nA\nB\nB\n");
        let stats = l.run().await.unwrap();
        assert_eq!(l.sink.sent, vec!["A", "B"]);
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.repeats_suppressed, 1);
        assert_eq!(l.last_sent(), Some("B"));
    }

    #[tokio::test]
    async fn test_flickering_code_is_not_sent() {
        let mut l = listener("A\nB\nA\nB\n");
        let stats = l.run().await.unwrap();
        assert!(l.sink.sent.is_empty());
        assert_eq!(stats.unstable, 1);
    }

    #[tokio::test]
    async fn test_blank_samples_break_nothing() {
        let mut l = listener("\n  \nC\nC\n");
        l.run().await.unwrap();
        assert_eq!(l.sink.sent, vec!["C"]);
    }

    #[tokio::test]
    async fn test_code_can_repeat_after_another() {
        let mut l = listener("A\nA\nB\nB\nA\nA\n");
        l.run().await.unwrap();
        assert_eq!(l.sink.sent, vec!["A", "B", "A"]);
    }

    #[tokio::test]
    async fn test_rejected_code_counts_as_failure_and_is_not_resent() {
        let mut l = listener("X\nX\nX\nX\n");
        l.sink.reject = Some("X".into());
        let stats = l.run().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.repeats_suppressed, 1);
        assert_eq!(l.sink.sent.len(), 1);
    }

    #[tokio::test]
    async fn test_single_sample_mode() {
        let mut l = listener("A\nB\n");
        l.settings.stable_samples = 1;
        l.run().await.unwrap();
        assert_eq!(l.sink.sent, vec!["A", "B"]);
    }
}

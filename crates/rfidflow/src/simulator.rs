//! Load simulator: posts synthetic readings with bounded concurrency.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::Rng;
use rfidflow_protocol::{ReadingReply, ReadingRequest};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::client::IngestClient;

const TAG_PREFIX: &str = "E200";
const TAG_HEX_DIGITS: usize = 12;

const OPERATORS: &[&str] = &["João Silva", "Maria Santos", "Pedro Costa", "Ana Lima", "Sistema Automático"];
const LOCATIONS: &[&str] = &[
    "Portaria Principal",
    "Depósito A - Setor 1",
    "Depósito B - Cheios",
    "Área de Carga - Doca 1",
    "Pátio Externo - Norte",
    "Caminhão 001",
];
const NOTES: &[&str] = &[
    "Botijão cheio - Pronto para entrega",
    "Botijão vazio - Retorno de cliente",
    "Recarga padrão",
    "Inspeção de qualidade aprovada",
    "Transferência entre depósitos",
];

/// EPC-like tag: `E200` followed by 12 uppercase hex digits.
pub fn random_tag<R: Rng + ?Sized>(rng: &mut R) -> String {
    const HEX: &[u8] = b"0123456789ABCDEF";
    let mut tag = String::with_capacity(TAG_PREFIX.len() + TAG_HEX_DIGITS);
    tag.push_str(TAG_PREFIX);
    for _ in 0..TAG_HEX_DIGITS {
        tag.push(HEX[rng.gen_range(0..HEX.len())] as char);
    }
    tag
}

/// A reading with plausible metadata for `tag`.
pub fn random_request<R: Rng + ?Sized>(rng: &mut R, tag: &str) -> ReadingRequest {
    let pick = |rng: &mut R, items: &[&str]| items.choose(rng).map(|s| s.to_string());
    ReadingRequest {
        tag_rfid: tag.to_string(),
        operador: pick(rng, OPERATORS),
        observacao: pick(rng, NOTES),
        localizacao_leitura: pick(rng, LOCATIONS),
        rssi: Some(rng.gen_range(-85..=-30)),
        antena: Some(rng.gen_range(1..=4)),
        leitor_id: Some(format!("READER-{:02}", rng.gen_range(1..=8))),
    }
}

#[derive(Debug, Clone)]
pub struct SimulationPlan {
    /// Readings to post
    pub readings: usize,
    /// Distinct tags the readings are spread over
    pub tags: usize,
    /// Requests in flight at once
    pub concurrency: usize,
    /// Pause before each request
    pub delay: Duration,
    pub progress: bool,
}

impl Default for SimulationPlan {
    fn default() -> Self {
        Self {
            readings: 100,
            tags: 20,
            concurrency: 8,
            delay: Duration::ZERO,
            progress: true,
        }
    }
}

/// Outcome of a simulation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationSummary {
    pub succeeded: u64,
    pub failed: u64,
    pub created: u64,
    pub elapsed: Duration,
}

impl SimulationSummary {
    pub fn total(&self) -> u64 {
        self.succeeded + self.failed
    }

    pub fn success_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.succeeded as f64 * 100.0 / total as f64,
        }
    }

    pub fn per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total() as f64 / secs
        } else {
            0.0
        }
    }
}

enum Posted {
    Ok { created: bool },
    Failed,
}

/// Post `plan.readings` readings over `plan.tags` random tags.
pub async fn run(client: &IngestClient, plan: &SimulationPlan) -> Result<SimulationSummary> {
    let started = Instant::now();
    let requests: Vec<ReadingRequest> = {
        let mut rng = rand::thread_rng();
        let pool: Vec<String> = (0..plan.tags.max(1)).map(|_| random_tag(&mut rng)).collect();
        (0..plan.readings)
            .map(|_| {
                let tag = pool.choose(&mut rng).cloned().unwrap_or_default();
                random_request(&mut rng, &tag)
            })
            .collect()
    };

    let progress = if plan.progress {
        let bar = ProgressBar::new(plan.readings as u64);
        if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} readings ({per_sec})") {
            bar.set_style(style);
        }
        bar
    } else {
        ProgressBar::hidden()
    };

    let permits = Arc::new(Semaphore::new(plan.concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let mut outcomes = Vec::with_capacity(plan.readings);
    for request in requests {
        let permit = permits.clone().acquire_owned().await?;
        let client = client.clone();
        let delay = plan.delay;
        tasks.spawn(async move {
            let _permit = permit;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            post_one(&client, &request).await
        });
        while let Some(done) = tasks.try_join_next() {
            outcomes.push(done?);
            progress.inc(1);
        }
    }
    while let Some(done) = tasks.join_next().await {
        outcomes.push(done?);
        progress.inc(1);
    }
    progress.finish_and_clear();

    let mut summary = SimulationSummary::default();
    for outcome in outcomes {
        match outcome {
            Posted::Ok { created } => {
                summary.succeeded += 1;
                summary.created += u64::from(created);
            }
            Posted::Failed => summary.failed += 1,
        }
    }
    summary.elapsed = started.elapsed();
    Ok(summary)
}

async fn post_one(client: &IngestClient, request: &ReadingRequest) -> Posted {
    match client.register_reading(request).await {
        Ok(reply) => match reply.body {
            ReadingReply::Registered(body) => Posted::Ok {
                created: body.data.criado,
            },
            ReadingReply::Failed(body) => {
                debug!(tag = %request.tag_rfid, status = %reply.status, error = %body.error, "Reading rejected");
                Posted::Failed
            }
        },
        Err(err) => {
            debug!(tag = %request.tag_rfid, error = %err, "Reading not delivered");
            Posted::Failed
        }
    }
}

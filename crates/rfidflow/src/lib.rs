//! RFID Flow client-side tooling
//!
//! HTTP client for a running server, the scan listener that forwards codes
//! from a handheld scanner, and the load simulator.

pub mod client;
pub mod listener;
pub mod simulator;

pub use client::{IngestClient, Reply};
pub use listener::{Listener, ListenerSettings, ListenerStats, LineSource, Sample, ScanSource};
pub use simulator::{SimulationPlan, SimulationSummary};

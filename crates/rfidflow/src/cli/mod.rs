//! Command implementations for the `rfidflow` binary.
//!
//! Administration commands open the database directly; `listen` and
//! `simulate` talk to a running server over HTTP.

pub mod context;
pub mod output;

pub mod asset;
pub mod audit;
pub mod ingest;
pub mod listen;
pub mod simulate;
pub mod stats;

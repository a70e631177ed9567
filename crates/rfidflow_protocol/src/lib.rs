//! Wire protocol for RFID Flow
//!
//! HTTP request/response bodies shared by the ingestion server and its
//! clients (CLI, scan listener, load simulator), plus the canonical
//! defaults and filesystem locations both sides agree on.

pub mod defaults;
pub mod error;
pub mod http_types;
pub mod paths;

pub use error::{ProtocolError, Result};
pub use http_types::{
    format_data_hora, parse_timezone, processing_error, BarcodeDashboard, BarcodeDashboardEntry,
    BarcodeReply, BarcodeRequest, BarcodeResponse, ErrorResponse, HealthResponse, ReadingData,
    ReadingReply, ReadingRequest, ReadingResponse,
};

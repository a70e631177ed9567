//! Canonical default values shared by the server and the CLI.

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_DB_FILE: &str = "rfidflow.sqlite3";
pub const DEFAULT_CONFIG_FILE: &str = "rfidflow.toml";
pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_LOCK_WAIT_MS: u64 = 5_000;
pub const DEFAULT_LOG_FILTER: &str = "rfidflow=info,rfidflow_server=info,rfidflow_db=info,tower_http=info";

/// Operator recorded for readings that arrive through the barcode endpoint.
pub const BARCODE_OPERATOR: &str = "Automático";
/// Origin recorded for barcode readings (handheld PDA).
pub const BARCODE_ORIGIN: &str = "PDA";
pub const BARCODE_NOTE: &str = "Leitura via API/ABD";

/// Seconds a client should wait before retrying after a lock timeout.
pub const RETRY_AFTER_SECS: u64 = 1;

// Routes
pub const ROUTE_REGISTER_READING: &str = "/api/registrar-leitura/";
pub const ROUTE_READINGS: &str = "/api/readings";
pub const ROUTE_BARCODE_REGISTER: &str = "/api/barcode/registrar/";
pub const ROUTE_BARCODE_DASHBOARD: &str = "/api/barcode/dashboard/";
pub const ROUTE_ASSET: &str = "/api/assets/:tag";
pub const ROUTE_DASHBOARD: &str = "/api/dashboard";
pub const ROUTE_METRICS: &str = "/metrics";
pub const ROUTE_HEALTH: &str = "/health";

//! Shared handler state.

use chrono_tz::Tz;
use rfidflow_db::RfidFlowDb;
use secstr::SecStr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: RfidFlowDb,
    /// Token required on `/api` routes
    pub ingest_token: Option<Arc<SecStr>>,
}

impl AppState {
    pub fn new(db: RfidFlowDb) -> Self {
        Self {
            db,
            ingest_token: None,
        }
    }

    pub fn with_token(mut self, token: Option<&str>) -> Self {
        self.ingest_token = token.map(|t| Arc::new(SecStr::from(t)));
        self
    }

    /// Business timezone for `data_hora` fields.
    pub fn timezone(&self) -> Tz {
        self.db.options().timezone
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("db", &self.db)
            .field("ingest_token", &self.ingest_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

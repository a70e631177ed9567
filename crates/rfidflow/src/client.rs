//! HTTP client for a running RFID Flow server.

use anyhow::{Context, Result};
use reqwest::StatusCode;
use rfidflow_protocol::defaults::{ROUTE_BARCODE_REGISTER, ROUTE_HEALTH, ROUTE_REGISTER_READING};
use rfidflow_protocol::{BarcodeReply, BarcodeRequest, HealthResponse, ReadingReply, ReadingRequest};
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts readings to the ingestion endpoints.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct IngestClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

/// Status and decoded body of one call
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub status: StatusCode,
    pub body: T,
}

impl IngestClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn register_reading(&self, request: &ReadingRequest) -> Result<Reply<ReadingReply>> {
        self.post(ROUTE_REGISTER_READING, request).await
    }

    pub async fn register_barcode(&self, code: &str) -> Result<Reply<BarcodeReply>> {
        let request = BarcodeRequest {
            barcode: code.to_string(),
        };
        self.post(ROUTE_BARCODE_REGISTER, &request).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.url(ROUTE_HEALTH);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        if !response.status().is_success() {
            anyhow::bail!("GET {} returned {}", url, response.status());
        }
        response
            .json()
            .await
            .with_context(|| format!("Invalid health response from {}", url))
    }

    async fn post<B, T>(&self, route: &str, body: &B) -> Result<Reply<T>>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(route);
        let mut request = self.http.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response from {}", url))?;
        let body = serde_json::from_str(&text)
            .with_context(|| format!("Unexpected {} response from {}: {}", status, url, text))?;
        Ok(Reply { status, body })
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }
}

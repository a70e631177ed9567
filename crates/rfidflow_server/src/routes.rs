//! HTTP handlers.

use axum::body::Bytes;
use axum::extract::{FromRequest, Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use rfidflow_db::{Asset, DashboardStats, NewReading, Reading, ReadingSource, METRICS};
use rfidflow_protocol::defaults::{BARCODE_NOTE, BARCODE_OPERATOR, BARCODE_ORIGIN};
use rfidflow_protocol::http_types::{
    ERR_BARCODE_EMPTY, ERR_BARCODE_METHOD_NOT_ALLOWED, ERR_METHOD_NOT_ALLOWED, ERR_TAG_REQUIRED,
};
use rfidflow_protocol::{
    format_data_hora, processing_error, BarcodeDashboard, BarcodeDashboardEntry, BarcodeRequest,
    BarcodeResponse, HealthResponse, ReadingData, ReadingRequest, ReadingResponse,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Readings shown with an asset
const ASSET_RECENT_READINGS: usize = 10;
/// Readings listed on the barcode dashboard
const BARCODE_DASHBOARD_READINGS: usize = 20;

// ============================================================================
// Reading Ingestion
// ============================================================================

pub async fn register_reading(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<ReadingResponse>, ApiError> {
    let body = parse_reading_request(req).await?;
    let Some(tag) = body.tag() else {
        return Err(ApiError::bad_request(ERR_TAG_REQUIRED));
    };

    let outcome = state
        .db
        .ingest_reading(NewReading {
            tag: tag.to_string(),
            source: ReadingSource::Rfid,
            operator: body.operador.clone(),
            location: body.localizacao_leitura.clone(),
            note: body.observacao.clone(),
            rssi: body.rssi,
            antenna: body.antena,
            reader_id: body.leitor_id.clone(),
            actor: None,
        })
        .await
        .map_err(|e| ApiError::from(e).map_internal(|m| processing_error(m)))?;

    Ok(Json(ReadingResponse::new(ReadingData {
        botijao_id: outcome.asset.id,
        tag_rfid: outcome.asset.tag.clone(),
        numero_serie: outcome.asset.serial_or_placeholder().to_string(),
        criado: outcome.created,
        leitura_id: outcome.reading.id,
        data_hora: format_data_hora(outcome.reading.read_at, state.timezone()),
    })))
}

pub async fn reading_method_not_allowed() -> ApiError {
    ApiError::method_not_allowed(ERR_METHOD_NOT_ALLOWED)
}

/// JSON when the content type says so, otherwise a form body.
async fn parse_reading_request(req: Request) -> Result<ReadingRequest, ApiError> {
    let is_json = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false);

    let rejected = |text: String| {
        debug!(reason = %text, "Malformed reading body");
        ApiError::bad_request(processing_error(text))
    };

    if is_json {
        let Json(body) = Json::<ReadingRequest>::from_request(req, &())
            .await
            .map_err(|e| rejected(e.body_text()))?;
        Ok(body)
    } else {
        let Form(body) = Form::<ReadingRequest>::from_request(req, &())
            .await
            .map_err(|e| rejected(e.body_text()))?;
        Ok(body)
    }
}

// ============================================================================
// Barcode Ingestion
// ============================================================================

/// The body is JSON whatever the content type; handheld listeners often omit it.
pub async fn register_barcode(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BarcodeResponse>, ApiError> {
    let request: BarcodeRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e)))?;
    let code = request.barcode.trim();
    if code.is_empty() {
        return Err(ApiError::bad_request(ERR_BARCODE_EMPTY));
    }

    let outcome = state
        .db
        .ingest_reading(NewReading {
            tag: code.to_string(),
            source: ReadingSource::Barcode,
            operator: Some(BARCODE_OPERATOR.to_string()),
            location: Some(BARCODE_ORIGIN.to_string()),
            note: Some(BARCODE_NOTE.to_string()),
            ..NewReading::default()
        })
        .await?;

    Ok(Json(BarcodeResponse {
        success: true,
        codigo: outcome.asset.tag,
        criado_novo: outcome.created,
        id_leitura: outcome.reading.id,
        data_hora: format_data_hora(outcome.reading.read_at, state.timezone()),
    }))
}

pub async fn barcode_method_not_allowed() -> ApiError {
    ApiError::method_not_allowed(ERR_BARCODE_METHOD_NOT_ALLOWED)
}

pub async fn barcode_dashboard(
    State(state): State<AppState>,
) -> Result<Json<BarcodeDashboard>, ApiError> {
    let total_hoje = state
        .db
        .count_readings_today(Some(ReadingSource::Barcode))
        .await?;
    let recent = state
        .db
        .list_recent_readings(Some(ReadingSource::Barcode), BARCODE_DASHBOARD_READINGS)
        .await?;

    let tz = state.timezone();
    let or_dash = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    let leituras: Vec<BarcodeDashboardEntry> = recent
        .into_iter()
        .map(|r| BarcodeDashboardEntry {
            codigo: r.tag,
            origem: or_dash(r.reading.location),
            operador: or_dash(r.reading.operator),
            observacao: or_dash(r.reading.note),
            data_hora: format_data_hora(r.reading.read_at, tz),
        })
        .collect();

    Ok(Json(BarcodeDashboard {
        success: true,
        total_hoje,
        ultimo_codigo: leituras.first().map(|e| e.codigo.clone()),
        leituras,
    }))
}

// ============================================================================
// Assets & Statistics
// ============================================================================

/// An asset with its most recent readings
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDetail {
    pub asset: Asset,
    /// Negative when overdue
    pub days_until_requalification: Option<i64>,
    /// Newest first
    pub recent_readings: Vec<Reading>,
}

pub async fn asset_detail(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<AssetDetail>, ApiError> {
    let tag = tag.trim();
    let asset = state
        .db
        .find_asset_by_tag(tag)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No asset with tag {}", tag)))?;
    let recent_readings = state
        .db
        .list_readings(asset.id, Some(ASSET_RECENT_READINGS))
        .await?;

    Ok(Json(AssetDetail {
        days_until_requalification: asset.days_until_requalification(state.db.today()),
        asset,
        recent_readings,
    }))
}

pub async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(state.db.dashboard_stats().await?))
}

// ============================================================================
// Service
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    pub format: Option<String>,
}

pub async fn metrics(Query(query): Query<MetricsQuery>) -> Response {
    match query.format.as_deref() {
        Some("prometheus") => {
            let mut resp = METRICS.prometheus_format().into_response();
            resp.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            resp
        }
        _ => Json(METRICS.snapshot()).into_response(),
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("No route for {}", uri.path()))
}

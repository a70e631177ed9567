//! HTTP API types for reading ingestion.
//!
//! Field names and messages are kept byte-compatible with the readers and
//! handheld listeners already deployed in the field, hence the Portuguese keys.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ProtocolError, Result};

// ============================================================================
// Messages
// ============================================================================

pub const MSG_READING_REGISTERED: &str = "Leitura registrada com sucesso.";
pub const ERR_TAG_REQUIRED: &str = "Tag RFID é obrigatória.";
pub const ERR_METHOD_NOT_ALLOWED: &str = "Método não permitido. Use POST.";
pub const ERR_BARCODE_METHOD_NOT_ALLOWED: &str = "Use POST";
pub const ERR_BARCODE_EMPTY: &str = "Barcode vazio";
pub const ERR_UNAUTHORIZED: &str = "Token de acesso inválido ou ausente.";

/// Error text when a reading body cannot be processed.
pub fn processing_error(detail: impl std::fmt::Display) -> String {
    format!("Erro ao processar leitura: {}", detail)
}

/// Timestamp format used by every `data_hora` field.
pub const DATA_HORA_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Render a timestamp as `data_hora` in the business timezone.
pub fn format_data_hora(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format(DATA_HORA_FORMAT).to_string()
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ProtocolError::UnknownTimezone(name.to_string()))
}

// ============================================================================
// Reading Ingestion
// ============================================================================

/// Body of `POST /api/registrar-leitura/` (JSON or form-encoded).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingRequest {
    #[serde(default, alias = "tag")]
    pub tag_rfid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operador: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observacao: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localizacao_leitura: Option<String>,
    /// Signal strength in dBm
    #[serde(default, deserialize_with = "lenient_i32", skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
    #[serde(default, deserialize_with = "lenient_i32", skip_serializing_if = "Option::is_none")]
    pub antena: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leitor_id: Option<String>,
}

impl ReadingRequest {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag_rfid: tag.into(),
            ..Self::default()
        }
    }

    /// Trimmed tag, or `None` when blank.
    pub fn tag(&self) -> Option<&str> {
        Some(self.tag_rfid.trim()).filter(|t| !t.is_empty())
    }
}

/// Success body of the reading endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingResponse {
    pub success: bool,
    pub message: String,
    pub data: ReadingData,
}

impl ReadingResponse {
    pub fn new(data: ReadingData) -> Self {
        Self {
            success: true,
            message: MSG_READING_REGISTERED.to_string(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingData {
    pub botijao_id: i64,
    pub tag_rfid: String,
    /// Serial number or `-`
    pub numero_serie: String,
    pub criado: bool,
    pub leitura_id: i64,
    pub data_hora: String,
}

/// Failure body shared by every ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// Either body of the reading endpoint, for clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingReply {
    Registered(ReadingResponse),
    Failed(ErrorResponse),
}

// ============================================================================
// Barcode Ingestion
// ============================================================================

/// Body of `POST /api/barcode/registrar/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BarcodeRequest {
    #[serde(default)]
    pub barcode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarcodeResponse {
    pub success: bool,
    pub codigo: String,
    pub criado_novo: bool,
    pub id_leitura: i64,
    pub data_hora: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BarcodeReply {
    Registered(BarcodeResponse),
    Failed(ErrorResponse),
}

/// Body of `GET /api/barcode/dashboard/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarcodeDashboard {
    pub success: bool,
    pub total_hoje: u64,
    pub ultimo_codigo: Option<String>,
    pub leituras: Vec<BarcodeDashboardEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarcodeDashboardEntry {
    pub codigo: String,
    pub origem: String,
    pub operador: String,
    pub observacao: String,
    pub data_hora: String,
}

// ============================================================================
// Service
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Accept an integer as a JSON number, a float (rounded), or a string, since
/// form bodies carry every value as text. Blank means absent.
fn lenient_i32<'de, D>(deserializer: D) -> std::result::Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Option::<NumberOrText>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(NumberOrText::Int(n)) => n,
        Some(NumberOrText::Float(f)) if f.is_finite() => f.round() as i64,
        Some(NumberOrText::Float(f)) => {
            return Err(D::Error::custom(format!("not a finite number: {}", f)))
        }
        Some(NumberOrText::Text(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            match s.parse::<i64>() {
                Ok(n) => n,
                Err(_) => s
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.round() as i64)
                    .ok_or_else(|| D::Error::custom(format!("not a number: {}", s)))?,
            }
        }
    };
    i32::try_from(value)
        .map(Some)
        .map_err(|_| D::Error::custom(format!("out of range: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_reading_request_accepts_tag_alias_and_text_numbers() {
        let req: ReadingRequest = serde_json::from_str(
            r#"{"tag": " E2001234 ", "operador": "Ana", "rssi": "-61", "antena": 2}"#,
        )
        .unwrap();
        assert_eq!(req.tag(), Some("E2001234"));
        assert_eq!(req.operador.as_deref(), Some("Ana"));
        assert_eq!(req.rssi, Some(-61));
        assert_eq!(req.antena, Some(2));
        assert_eq!(req.leitor_id, None);
    }

    #[test]
    fn test_reading_request_blank_and_float_numbers() {
        let req: ReadingRequest =
            serde_json::from_str(r#"{"tag_rfid": "X", "rssi": "", "antena": 1.0}"#).unwrap();
        assert_eq!(req.rssi, None);
        assert_eq!(req.antena, Some(1));

        let bad = serde_json::from_str::<ReadingRequest>(r#"{"tag_rfid": "X", "rssi": "loud"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_missing_tag_is_blank() {
        let req: ReadingRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.tag(), None);
    }

    #[test]
    fn test_reading_response_shape() {
        let body = ReadingResponse::new(ReadingData {
            botijao_id: 7,
            tag_rfid: "E2001234".into(),
            numero_serie: "-".into(),
            criado: true,
            leitura_id: 1,
            data_hora: "09/03/2024 14:05:00".into(),
        });
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Leitura registrada com sucesso.");
        assert_eq!(json["data"]["botijao_id"], 7);
        assert_eq!(json["data"]["criado"], true);
    }

    #[test]
    fn test_reply_distinguishes_failure() -> anyhow::Result<()> {
        let reply: ReadingReply =
            serde_json::from_str(r#"{"success": false, "error": "Tag RFID é obrigatória."}"#)?;
        assert_eq!(reply, ReadingReply::Failed(ErrorResponse::new(ERR_TAG_REQUIRED)));
        Ok(())
    }

    #[test]
    fn test_data_hora_in_business_timezone() -> anyhow::Result<()> {
        let tz = parse_timezone("America/Sao_Paulo")?;
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 17, 5, 0).unwrap();
        assert_eq!(format_data_hora(at, tz), "09/03/2024 14:05:00");
        Ok(())
    }

    #[test]
    fn test_unknown_timezone() {
        assert!(matches!(
            parse_timezone("Mars/Olympus"),
            Err(ProtocolError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn test_processing_error_message() {
        assert_eq!(processing_error("boom"), "Erro ao processar leitura: boom");
    }
}

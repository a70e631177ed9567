//! Wire compatibility with the handheld listeners and readers in the field.
//!
//! These bodies are what deployed clients send and parse; key names and
//! messages must not drift.

use rfidflow_protocol::defaults::{
    BARCODE_ORIGIN, BARCODE_NOTE, BARCODE_OPERATOR, ROUTE_BARCODE_DASHBOARD,
    ROUTE_BARCODE_REGISTER, ROUTE_REGISTER_READING,
};
use rfidflow_protocol::http_types::ERR_BARCODE_EMPTY;
use rfidflow_protocol::*;

#[test]
fn test_route_paths() {
    assert_eq!(ROUTE_REGISTER_READING, "/api/registrar-leitura/");
    assert_eq!(ROUTE_BARCODE_REGISTER, "/api/barcode/registrar/");
    assert_eq!(ROUTE_BARCODE_DASHBOARD, "/api/barcode/dashboard/");
}

#[test]
fn test_barcode_defaults() {
    assert_eq!(BARCODE_OPERATOR, "Automático");
    assert_eq!(BARCODE_ORIGIN, "PDA");
    assert_eq!(BARCODE_NOTE, "Leitura via API/ABD");
}

#[test]
fn test_reader_body_with_every_field() {
    let body = r#"{
        "tag_rfid": "E20000112233AABB",
        "operador": "João Silva",
        "observacao": "Recarga padrão",
        "localizacao_leitura": "Depósito A - Setor 1",
        "rssi": -58,
        "antena": 3,
        "leitor_id": "READER-02"
    }"#;
    let req: ReadingRequest = serde_json::from_str(body).unwrap();
    assert_eq!(req.tag(), Some("E20000112233AABB"));
    assert_eq!(req.localizacao_leitura.as_deref(), Some("Depósito A - Setor 1"));
    assert_eq!(req.rssi, Some(-58));
    assert_eq!(req.antena, Some(3));
    assert_eq!(req.leitor_id.as_deref(), Some("READER-02"));
}

#[test]
fn test_request_omits_absent_fields() {
    let json = serde_json::to_value(ReadingRequest::new("E2001234")).unwrap();
    assert_eq!(json, serde_json::json!({ "tag_rfid": "E2001234" }));
}

#[test]
fn test_barcode_reply_parses_both_shapes() {
    let ok: BarcodeReply = serde_json::from_str(
        r#"{"success": true, "codigo": "7891", "criado_novo": false, "id_leitura": 12, "data_hora": "09/03/2024 14:05:00"}"#,
    )
    .unwrap();
    match ok {
        BarcodeReply::Registered(body) => {
            assert_eq!(body.codigo, "7891");
            assert!(!body.criado_novo);
            assert_eq!(body.id_leitura, 12);
        }
        BarcodeReply::Failed(body) => panic!("parsed as failure: {:?}", body),
    }

    let failed: BarcodeReply =
        serde_json::from_str(r#"{"success": false, "error": "Barcode vazio"}"#).unwrap();
    assert_eq!(failed, BarcodeReply::Failed(ErrorResponse::new(ERR_BARCODE_EMPTY)));
}

#[test]
fn test_barcode_dashboard_keys() {
    let dashboard = BarcodeDashboard {
        success: true,
        total_hoje: 2,
        ultimo_codigo: Some("7892".into()),
        leituras: vec![BarcodeDashboardEntry {
            codigo: "7892".into(),
            origem: "PDA".into(),
            operador: "Automático".into(),
            observacao: "-".into(),
            data_hora: "09/03/2024 14:05:00".into(),
        }],
    };
    let json = serde_json::to_value(&dashboard).unwrap();
    assert_eq!(json["total_hoje"], 2);
    assert_eq!(json["ultimo_codigo"], "7892");
    assert_eq!(json["leituras"][0]["origem"], "PDA");
    assert_eq!(json["leituras"][0]["observacao"], "-");
}

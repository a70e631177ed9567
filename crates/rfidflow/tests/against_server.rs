//! Client-side tooling against a live server on a loopback port.

use rfidflow::simulator::{self, SimulationPlan};
use rfidflow::{IngestClient, LineSource, Listener, ListenerSettings};
use rfidflow_db::{DbOptions, ReadingSource, RfidFlowDb};
use rfidflow_protocol::{BarcodeReply, ReadingReply, ReadingRequest};
use rfidflow_server::{build_router, AppState};
use std::time::Duration;
use tokio::net::TcpListener;

async fn spawn_server(token: Option<&str>) -> (String, RfidFlowDb, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = RfidFlowDb::open(dir.path().join("cli.sqlite3"), DbOptions::default())
        .await
        .unwrap();
    let app = build_router(AppState::new(db.clone()).with_token(token));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), db, dir)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_client_reading_roundtrip() {
    let (url, db, _dir) = spawn_server(None).await;
    let client = IngestClient::new(&url, None).unwrap();

    let health = client.health().await.unwrap();
    assert_eq!(health.status, "ok");

    let reply = client
        .register_reading(&ReadingRequest::new("E2001234"))
        .await
        .unwrap();
    assert!(reply.status.is_success());
    match reply.body {
        ReadingReply::Registered(body) => {
            assert!(body.data.criado);
            assert_eq!(body.data.tag_rfid, "E2001234");
        }
        ReadingReply::Failed(body) => panic!("rejected: {}", body.error),
    }

    let reply = client.register_reading(&ReadingRequest::new("  ")).await.unwrap();
    assert_eq!(reply.status.as_u16(), 400);
    assert!(matches!(reply.body, ReadingReply::Failed(_)));

    let asset = db.find_asset_by_tag("E2001234").await.unwrap().unwrap();
    assert_eq!(asset.rotation.ordinal, Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_token_is_sent() {
    let (url, _db, _dir) = spawn_server(Some("s3cret")).await;

    let anonymous = IngestClient::new(&url, None).unwrap();
    let reply = anonymous.register_barcode("789").await.unwrap();
    assert_eq!(reply.status.as_u16(), 401);
    assert!(matches!(reply.body, BarcodeReply::Failed(_)));

    let client = IngestClient::new(&url, Some("s3cret".into())).unwrap();
    let reply = client.register_barcode("789").await.unwrap();
    assert!(matches!(reply.body, BarcodeReply::Registered(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_listener_posts_stable_codes() {
    let (url, db, _dir) = spawn_server(None).await;
    let client = IngestClient::new(&url, None).unwrap();

    let input: &[u8] = b"7891\n7891\n7891\n7891\n\n7892\n7892\n";
    let settings = ListenerSettings {
        sample_interval: Duration::ZERO,
        ..ListenerSettings::polled()
    };
    let mut listener = Listener::new(LineSource::new(input), client, settings);
    let stats = listener.run().await.unwrap();

    assert_eq!(stats.sent, 2);
    assert_eq!(stats.repeats_suppressed, 1);
    assert_eq!(listener.last_sent(), Some("7892"));
    assert_eq!(
        db.count_readings_today(Some(ReadingSource::Barcode)).await.unwrap(),
        2
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simulation_keeps_rotation_consistent() {
    let (url, db, _dir) = spawn_server(None).await;
    let client = IngestClient::new(&url, None).unwrap();

    let plan = SimulationPlan {
        readings: 40,
        tags: 3,
        concurrency: 8,
        delay: Duration::ZERO,
        progress: false,
    };
    let summary = simulator::run(&client, &plan).await.unwrap();
    assert_eq!(summary.succeeded, 40);
    assert_eq!(summary.failed, 0);
    assert!(summary.created >= 1 && summary.created <= 3);

    let assets = db.list_assets(&Default::default()).await.unwrap();
    assert_eq!(assets.len() as u64, summary.created);
    let total: i64 = assets.iter().map(|a| a.reading_count).sum();
    assert_eq!(total, 40);
    for asset in assets {
        let expected = ((asset.reading_count - 1) % 4) as u8;
        assert_eq!(asset.rotation.ordinal, Some(expected), "asset {}", asset.tag);
    }
}

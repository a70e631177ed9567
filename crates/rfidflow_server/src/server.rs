//! Router assembly and the serve loop.

use anyhow::Context;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use rfidflow_db::RfidFlowDb;
use rfidflow_protocol::defaults::{
    ROUTE_ASSET, ROUTE_BARCODE_DASHBOARD, ROUTE_BARCODE_REGISTER, ROUTE_DASHBOARD, ROUTE_HEALTH,
    ROUTE_METRICS, ROUTE_READINGS, ROUTE_REGISTER_READING,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::require_token;
use crate::config::ServiceConfig;
use crate::routes;
use crate::state::AppState;

/// Build the application router.
///
/// `/api` routes sit behind the token check; `/health` and `/metrics` stay open.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            ROUTE_REGISTER_READING,
            post(routes::register_reading).fallback(routes::reading_method_not_allowed),
        )
        .route(
            ROUTE_READINGS,
            post(routes::register_reading).fallback(routes::reading_method_not_allowed),
        )
        .route(
            ROUTE_BARCODE_REGISTER,
            post(routes::register_barcode).fallback(routes::barcode_method_not_allowed),
        )
        .route(ROUTE_BARCODE_DASHBOARD, get(routes::barcode_dashboard))
        .route(ROUTE_ASSET, get(routes::asset_detail))
        .route(ROUTE_DASHBOARD, get(routes::dashboard))
        .route_layer(from_fn_with_state(state.clone(), require_token));

    Router::new()
        .merge(api)
        .route(ROUTE_METRICS, get(routes::metrics))
        .route(ROUTE_HEALTH, get(routes::health))
        .fallback(routes::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the database and serve until ctrl-c or SIGTERM.
pub async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    let options = config.db_options()?;
    let db = RfidFlowDb::open(&config.database.path, options)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;

    let token = config.ingest_token();
    if token.is_none() {
        warn!("No ingest_token configured; /api routes accept unauthenticated requests");
    }
    let state = AppState::new(db.clone()).with_token(token);

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(
        addr = %listener.local_addr()?,
        database = %config.database.path.display(),
        "RFID Flow server listening"
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    db.close().await;
    info!("RFID Flow server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use rlock_core::CachingLockClient;
use rlock_core::types::LockStatus;

use crate::handlers::{CallbackRequest, StatusResponse};

/// The callback listener a client process exposes to the lock server.
pub fn router(client: Arc<CachingLockClient>) -> Router {
    Router::new()
        .route("/revoke", post(revoke))
        .route("/retry", post(retry))
        .layer(TraceLayer::new_for_http())
        .with_state(client)
}

pub async fn serve(listener: TcpListener, client: Arc<CachingLockClient>) -> std::io::Result<()> {
    axum::serve(listener, router(client)).await
}

async fn revoke(
    State(client): State<Arc<CachingLockClient>>,
    Json(req): Json<CallbackRequest>,
) -> Json<StatusResponse> {
    let CallbackRequest { lid, xid } = req;
    // Blocks until local holders are done; keep it off the async workers.
    let status = tokio::task::spawn_blocking(move || client.revoke_handler(lid, xid))
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, lid = %lid, "Revoke handler panicked");
            LockStatus::IoErr
        });
    Json(StatusResponse { status })
}

async fn retry(
    State(client): State<Arc<CachingLockClient>>,
    Json(req): Json<CallbackRequest>,
) -> Json<StatusResponse> {
    let status = client.retry_handler(req.lid, req.xid);
    Json(StatusResponse { status })
}

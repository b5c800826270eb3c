use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use clap::ValueEnum;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use rlock_core::dispatch::DispatchConfig;
use rlock_core::error::TransportError;
use rlock_core::infrastructure::SnapshotStore;
use rlock_core::infrastructure_in_memory::InMemorySnapshotStore;
use rlock_core::replica::{LocalReplica, PrimaryGate};
use rlock_core::transport::LockService;
use rlock_core::types::{LockId, LockStatus};
use rlock_core::{CachingLockServer, ReplicatedLockServer};

use crate::handlers::*;
use crate::http_transport::HttpCallbackConnector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Single server; head-of-queue acquires block until handed the lock
    Basic,
    /// Deduplicating server with state transfer and primary/backup roles
    Replicated,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Basic => write!(f, "basic"),
            Mode::Replicated => write!(f, "replicated"),
        }
    }
}

pub struct ServeOptions {
    pub host: String,
    pub port: u16,
    pub mode: Mode,
    pub storage: String,
    pub checkpoint: Duration,
    pub standby: bool,
    pub retry_backoff: Duration,
}

/// Replicated-mode extras: the role switch and the checkpoint store.
pub struct Replication {
    replica: Arc<LocalReplica>,
    store: Mutex<Box<dyn SnapshotStore>>,
}

pub struct Node {
    mode: Mode,
    service: Arc<dyn LockService>,
    replication: Option<Replication>,
}

pub type AppState = Arc<Node>;

type ApiError = (StatusCode, Json<ApiResponse<()>>);

pub async fn run(opts: ServeOptions) -> anyhow::Result<()> {
    let node = Arc::new(create_node(&opts)?);

    if let Some(replication) = &node.replication {
        restore_checkpoint(replication).await?;
        tokio::spawn(checkpoint_loop(node.clone(), opts.checkpoint));
    }

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/acquire", post(acquire))
        .route("/release", post(release))
        .route("/stat/{lid}", get(stat));
    if node.replication.is_some() {
        app = app
            .route("/state", get(get_state).put(put_state))
            .route("/promote", post(promote))
            .route("/demote", post(demote));
    }
    let app = app.layer(TraceLayer::new_for_http()).with_state(node.clone());

    let addr = format!("{}:{}", opts.host, opts.port);
    tracing::info!(mode = %opts.mode, "🔒 rlock server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(replication) = &node.replication {
        checkpoint(replication).await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

fn create_node(opts: &ServeOptions) -> anyhow::Result<Node> {
    let connector = Arc::new(HttpCallbackConnector::new());
    let config = DispatchConfig {
        retry_backoff: opts.retry_backoff,
    };

    match opts.mode {
        Mode::Basic => {
            if opts.storage != "memory" {
                tracing::warn!("Storage '{}' ignored: basic mode keeps no snapshots", opts.storage);
            }
            let server = CachingLockServer::with_config(connector, config)
                .context("failed to start dispatch workers")?;
            Ok(Node {
                mode: opts.mode,
                service: Arc::new(server),
                replication: None,
            })
        }
        Mode::Replicated => {
            let replica = Arc::new(LocalReplica::new(!opts.standby));
            let server = ReplicatedLockServer::with_config(replica.clone(), connector, config)
                .context("failed to start dispatch workers")?;
            tracing::info!(primary = !opts.standby, "Replica role");
            Ok(Node {
                mode: opts.mode,
                service: server,
                replication: Some(Replication {
                    replica,
                    store: Mutex::new(create_store(&opts.storage)),
                }),
            })
        }
    }
}

// ─── Checkpoints ────────────────────────────────────────────────────────────

async fn restore_checkpoint(replication: &Replication) -> anyhow::Result<()> {
    let latest = replication.store.lock().await.load().context("failed to read checkpoint")?;
    match latest {
        Some(bytes) => {
            replication
                .replica
                .restore(&bytes)
                .context("failed to restore checkpoint")?;
            tracing::info!(bytes = bytes.len(), "Restored state from checkpoint");
        }
        None => tracing::info!("No checkpoint found, starting empty"),
    }
    Ok(())
}

async fn checkpoint_loop(node: AppState, every: Duration) {
    let Some(replication) = &node.replication else {
        return;
    };
    let mut ticker = tokio::time::interval(every);
    // The first tick fires immediately and there is nothing new to save yet.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        checkpoint(replication).await;
    }
}

async fn checkpoint(replication: &Replication) {
    let bytes = match replication.replica.snapshot() {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize state for checkpoint");
            return;
        }
    };
    let mut store = replication.store.lock().await;
    match store.save(&bytes) {
        Ok(()) => tracing::debug!(bytes = bytes.len(), checkpoints = store.checkpoints(), "Checkpoint written"),
        Err(e) => tracing::error!(error = %e, "Failed to write checkpoint"),
    }
}

// ─── Handlers ───────────────────────────────────────────────────────────────

fn bad_request(msg: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::err(msg)))
}

fn internal(msg: impl Into<String>) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ApiResponse::err(msg)))
}

/// Run a lock call on the blocking pool; basic-mode acquires park there
/// until the current owner lets go.
async fn call_service<F>(call: F) -> Result<LockStatus, ApiError>
where
    F: FnOnce() -> Result<LockStatus, TransportError> + Send + 'static,
{
    match tokio::task::spawn_blocking(call).await {
        Ok(Ok(status)) => Ok(status),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Lock call failed");
            Ok(LockStatus::IoErr)
        }
        Err(e) => Err(internal(format!("lock call panicked: {e}"))),
    }
}

async fn health(State(node): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let primary = node
        .replication
        .as_ref()
        .is_none_or(|r| r.replica.is_primary());
    Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        mode: node.mode.to_string(),
        primary,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn acquire(
    State(node): State<AppState>,
    Json(req): Json<LockRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    req.validate().map_err(bad_request)?;
    let service = node.service.clone();
    let LockRequest { lid, client_id, xid } = req;
    let status = call_service(move || service.acquire(lid, &client_id, xid)).await?;
    Ok(Json(StatusResponse { status }))
}

async fn release(
    State(node): State<AppState>,
    Json(req): Json<LockRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    req.validate().map_err(bad_request)?;
    let service = node.service.clone();
    let LockRequest { lid, client_id, xid } = req;
    let status = call_service(move || service.release(lid, &client_id, xid)).await?;
    Ok(Json(StatusResponse { status }))
}

async fn stat(State(node): State<AppState>, Path(lid): Path<u64>) -> Result<Json<StatResponse>, ApiError> {
    let lid = LockId(lid);
    let acquires = node
        .service
        .stat(lid)
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(StatResponse { lid, acquires }))
}

fn replication(node: &Node) -> Result<&Replication, ApiError> {
    node.replication
        .as_ref()
        .ok_or_else(|| bad_request("not running in replicated mode"))
}

async fn get_state(State(node): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let replication = replication(&node)?;
    let bytes = replication
        .replica
        .snapshot()
        .map_err(|e| internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes))
}

async fn put_state(
    State(node): State<AppState>,
    body: Bytes,
) -> Result<Json<ApiResponse<RestoreResponse>>, ApiError> {
    let replication = replication(&node)?;
    replication
        .replica
        .restore(&body)
        .map_err(|e| bad_request(e.to_string()))?;
    tracing::info!(bytes = body.len(), "State restored from peer");
    Ok(Json(ApiResponse::ok(RestoreResponse {
        restored_bytes: body.len(),
    })))
}

async fn promote(State(node): State<AppState>) -> Result<Json<ApiResponse<RoleResponse>>, ApiError> {
    let replication = replication(&node)?;
    replication.replica.promote();
    Ok(Json(ApiResponse::ok(RoleResponse { primary: true })))
}

async fn demote(State(node): State<AppState>) -> Result<Json<ApiResponse<RoleResponse>>, ApiError> {
    let replication = replication(&node)?;
    replication.replica.demote();
    Ok(Json(ApiResponse::ok(RoleResponse { primary: false })))
}

// ─── Storage Backend Selection ──────────────────────────────────────────────

fn create_store(storage: &str) -> Box<dyn SnapshotStore> {
    if storage == "memory" {
        tracing::info!("💾 Checkpoint store: in-memory (state will not survive a restart)");
        Box::new(InMemorySnapshotStore::new())
    } else if let Some(path) = storage.strip_prefix("sqlite:") {
        #[cfg(feature = "sqlite")]
        {
            tracing::info!("💾 Checkpoint store: SQLite ({})", path);
            match rlock_core::infrastructure_sqlite::SqliteSnapshotStore::open(path) {
                Ok(store) => Box::new(store),
                Err(e) => {
                    tracing::error!("Failed to open SQLite: {}. Falling back to in-memory.", e);
                    Box::new(InMemorySnapshotStore::new())
                }
            }
        }
        #[cfg(not(feature = "sqlite"))]
        {
            tracing::error!(
                "SQLite storage requested but `sqlite` feature is not enabled. \
                 Rebuild with: cargo build --features sqlite"
            );
            tracing::warn!("Falling back to in-memory storage.");
            let _ = path;
            Box::new(InMemorySnapshotStore::new())
        }
    } else {
        tracing::error!(
            "Unknown storage backend: '{}'. Use 'memory' or 'sqlite:<path>'", storage
        );
        tracing::warn!("Falling back to in-memory storage.");
        Box::new(InMemorySnapshotStore::new())
    }
}

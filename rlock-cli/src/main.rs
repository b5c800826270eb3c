mod callback;
mod handlers;
mod http_transport;
mod server;

#[cfg(test)]
mod handlers_test;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rlock_core::CachingLockClient;
use rlock_core::local_table::LocalState;
use rlock_core::transport::LockService;
use rlock_core::types::{ClientId, LockId};

use crate::http_transport::HttpLockService;
use crate::server::{Mode, ServeOptions};

#[derive(Parser)]
#[command(
    name = "rlock",
    about = "rlock: caching distributed lock server and client",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the rlock HTTP lock server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3100")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Server flavour
        #[arg(long, value_enum, default_value = "basic", env = "RLOCK_MODE")]
        mode: Mode,

        /// Checkpoint store for replicated mode: "memory" or "sqlite:<path>"
        #[arg(long, default_value = "memory", env = "RLOCK_STORAGE")]
        storage: String,

        /// Interval between checkpoints in replicated mode
        #[arg(long, default_value = "5000")]
        checkpoint_ms: u64,

        /// Start as a backup replica (replicated mode only)
        #[arg(long)]
        standby: bool,

        /// Pause before a failed revoke or retry is attempted again
        #[arg(long, default_value = "100")]
        retry_backoff_ms: u64,
    },

    /// Acquire a lock through a caching client, hold it, then keep it cached
    /// until the server revokes it
    Hold {
        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:3100", env = "RLOCK_SERVER")]
        server: String,

        /// Lock ID
        #[arg(long)]
        lid: u64,

        /// How long to hold the lock before releasing it locally
        #[arg(long, default_value = "1000")]
        hold_ms: u64,

        /// Address the server uses to reach this client
        #[arg(long, default_value = "127.0.0.1")]
        callback_host: String,

        /// Callback port; 0 picks a free one
        #[arg(long, default_value = "0")]
        callback_port: u16,
    },

    /// Print a server's grant counter
    Stat {
        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:3100", env = "RLOCK_SERVER")]
        server: String,

        /// Lock ID
        #[arg(long, default_value = "0")]
        lid: u64,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            mode,
            storage,
            checkpoint_ms,
            standby,
            retry_backoff_ms,
        } => {
            server::run(ServeOptions {
                host,
                port,
                mode,
                storage,
                checkpoint: Duration::from_millis(checkpoint_ms),
                standby,
                retry_backoff: Duration::from_millis(retry_backoff_ms),
            })
            .await?;
        }
        Commands::Hold {
            server,
            lid,
            hold_ms,
            callback_host,
            callback_port,
        } => {
            hold(&server, LockId(lid), Duration::from_millis(hold_ms), &callback_host, callback_port).await?;
        }
        Commands::Stat { server, lid } => {
            let service = HttpLockService::new(server);
            let acquires = tokio::task::spawn_blocking(move || service.stat(LockId(lid))).await??;
            println!(
                "{}",
                serde_json::to_string_pretty(&handlers::StatResponse {
                    lid: LockId(lid),
                    acquires
                })?
            );
        }
        Commands::Version => {
            println!("rlock {}", env!("CARGO_PKG_VERSION"));
            println!("Caching distributed lock service");
        }
    }
    Ok(())
}

async fn hold(
    server: &str,
    lid: LockId,
    hold_for: Duration,
    callback_host: &str,
    callback_port: u16,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((callback_host, callback_port))
        .await
        .with_context(|| format!("failed to bind callback listener on {callback_host}:{callback_port}"))?;
    let port = listener.local_addr()?.port();
    let id = ClientId::new(format!("{callback_host}:{port}"));

    let client = Arc::new(CachingLockClient::new(id.clone(), Arc::new(HttpLockService::new(server))));
    let callbacks = tokio::spawn(callback::serve(listener, client.clone()));
    tracing::info!(client = %id, "Callback listener ready");

    let worker = client.clone();
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        worker.acquire(lid)?;
        tracing::info!(lid = %lid, "🔒 Lock acquired");
        std::thread::sleep(hold_for);
        worker.release(lid)?;
        tracing::info!(lid = %lid, "Lock released locally, still cached");
        Ok(())
    })
    .await??;

    tokio::select! {
        _ = wait_for_revoke(&client, lid) => tracing::info!(lid = %lid, "Lock handed back to the server"),
        _ = tokio::signal::ctrl_c() => tracing::warn!(lid = %lid, "Interrupted while still caching the lock"),
    }
    callbacks.abort();
    Ok(())
}

async fn wait_for_revoke(client: &CachingLockClient, lid: LockId) {
    while client.state(lid) != LocalState::None {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

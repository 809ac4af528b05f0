//! tsrelay server binary
//!
//! Wires the engine, pools, schema registry, and HTTP transport together and
//! serves the remote-write/remote-read endpoints until a termination signal
//! arrives, then drains in-flight requests within a bounded grace period
//! before closing the pools and the engine handle.

use tsrelay::api::metrics::Metrics;
use tsrelay::api::{build_router, AppState};
use tsrelay::config::Config;
use tsrelay::engine::MemoryEngine;
use tsrelay::pool::{OperationClass, ResourcePool};
use tsrelay::read::{ReadLimits, Reader};
use tsrelay::schema::SchemaRegistry;
use tsrelay::write::Writer;

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// How long in-flight requests may drain after a termination signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// tsrelay - Prometheus remote storage over an embedded SQL engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "TSRELAY_CONFIG", default_value = "config.yml")]
    config: String,

    /// Log level
    #[arg(long, env = "TSRELAY_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level: Level = args.log_level.parse()?;
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load(&args.config)?;
    info!(config = %args.config, "configuration loaded");

    // The in-memory engine backs development mode; production builds link the
    // embedded engine binding behind the same trait.
    let engine = Arc::new(MemoryEngine::new());

    let write_pool = ResourcePool::new(
        engine.as_ref(),
        OperationClass::Write,
        config.pool.write_pool_size,
        config.pool.write_timeout(),
    )?;
    let read_pool = ResourcePool::new(
        engine.as_ref(),
        OperationClass::Read,
        config.pool.read_pool_size,
        config.pool.read_timeout(),
    )?;
    info!(
        write_capacity = write_pool.capacity(),
        read_capacity = read_pool.capacity(),
        "resource pools initialized"
    );

    let registry = Arc::new(SchemaRegistry::new(&config.table));
    registry.bootstrap(&write_pool).await?;

    let metrics = Arc::new(Metrics::new());
    let state = AppState {
        writer: Arc::new(Writer::new(
            write_pool.clone(),
            registry.clone(),
            metrics.clone(),
        )),
        reader: Arc::new(Reader::new(
            read_pool.clone(),
            registry.clone(),
            ReadLimits {
                max_window_ms: config.table.max_window_ms(),
                max_rows: config.table.max_count,
            },
            metrics.clone(),
        )),
        metrics,
    };

    let router = build_router(state, &config.http_server);
    let addr = format!("0.0.0.0:{}", config.http_server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        addr = %addr,
        write_url = %config.http_server.write_url,
        read_url = %config.http_server.read_url,
        "listening"
    );

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = stop_tx.send(());

    // Bounded drain: in-flight requests get the grace period, no more.
    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(Ok(()))) => info!("listener stopped"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!("shutdown grace period elapsed with requests still in flight"),
    }

    // Pools close only after the listener has stopped accepting work.
    write_pool.drain();
    read_pool.drain();
    drop(engine);
    info!("shutdown complete");
    Ok(())
}

/// Resolves once SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!(error = %e, "cannot install SIGTERM handler"),
        }
    };

    tokio::select! {
        _ = ctrl_c => warn!("received SIGINT, shutting down"),
        _ = terminate => warn!("received SIGTERM, shutting down"),
    }
}

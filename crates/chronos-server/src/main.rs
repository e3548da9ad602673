//! Chronos server binary: boots the segmented store, predictive
//! prefetcher, adaptive TTL controller and their background schedulers,
//! then serves RESP2 and read-only HTTP connections until a shutdown
//! signal arrives.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chronos_core::{ChronosConfig, SnapshotCodec};
use chronos_server::App;

/// Chronos - an in-memory cache with predictive prefetch and adaptive TTL.
#[derive(Parser, Debug)]
#[command(name = "chronos-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a `chronos.toml` configuration file.
    #[arg(short, long, default_value = "chronos.toml", env = "CHRONOS_CONFIG_PATH")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Config must be loaded before tracing is initialized so its
    // `logging.level`/`logging.format` can drive the subscriber.
    let config = if std::path::Path::new(&args.config).exists() {
        ChronosConfig::load_from_path(&args.config)?
    } else {
        ChronosConfig::load()?
    };

    init_tracing(&config.logging);

    tracing::info!(
        segments = config.effective_segment_count(),
        max_memory_bytes = config.store.max_memory_bytes,
        "starting Chronos"
    );

    let mut app = App::new(config);
    app.start_background_tasks();

    let server = app.server_config().clone();
    let resp_addr = SocketAddr::from_str(&format!("{}:{}", server.host, server.resp_port))?;
    let http_addr = SocketAddr::from_str(&format!("{}:{}", server.host, server.http_port))?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let state = Arc::clone(&app.state);

    let resp_task = tokio::spawn(chronos_server::resp::server::serve(
        resp_addr,
        Arc::clone(&state),
        shutdown_rx.clone(),
    ));

    let http_router = chronos_server::http::router(Arc::clone(&state));
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(%http_addr, "HTTP listener bound");
    let mut http_shutdown_rx = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        axum::serve(http_listener, http_router)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown_rx.changed().await;
            })
            .await
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = resp_task.await?;
    http_task.await??;

    if app.snapshot_config().enabled {
        let path = app.snapshot_config().path.clone();
        match SnapshotCodec::write(&app.state.store, &path) {
            Ok(written) => tracing::info!(written, %path, "wrote final snapshot on shutdown"),
            Err(err) => tracing::warn!(%err, %path, "final snapshot write failed"),
        }
    }

    app.shutdown();
    tracing::info!("Chronos stopped");
    Ok(())
}

fn init_tracing(config: &chronos_core::config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

//! Storefront Cache - caching agent binary
//!
//! Serves the caching proxy and the agent endpoints over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_cache::api::{create_router, AppState};
use storefront_cache::clock::{SharedClock, SystemClock};
use storefront_cache::fetch::HttpFetcher;
use storefront_cache::storage::{FileStorage, SharedStore};
use storefront_cache::{spawn_control_channel, spawn_sweep_task, CacheAgent, CacheService, Config};

/// Capacity of the control message queue.
const CONTROL_CAPACITY: usize = 32;

/// Main entry point for the caching agent.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open durable storage and hydrate the cache service
/// 4. Install (and, with skip-waiting, activate) the cache agent
/// 5. Start the control channel and the background sweep tasks
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Storefront Cache Agent");

    let config = Config::from_env();
    info!(
        "Configuration loaded: version={}, upstream={}, port={}, sweep_interval={}s",
        config.version, config.upstream_url, config.server_port, config.sweep_interval
    );

    let clock: SharedClock = Arc::new(SystemClock);

    // Durable storage for allow-listed cache service keys
    let storage: Option<SharedStore> = match &config.storage_dir {
        Some(dir) => {
            let store: SharedStore = Arc::new(
                FileStorage::open(dir)
                    .with_context(|| format!("failed to open storage dir {}", dir.display()))?,
            );
            info!("Durable storage at {}", dir.display());
            Some(store)
        }
        None => {
            info!("No STORAGE_DIR set, cache service is memory-only");
            None
        }
    };

    let service = Arc::new(CacheService::from_config(&config, clock.clone(), storage));
    service.hydrate();

    let agent = Arc::new(
        CacheAgent::new(&config, Arc::new(HttpFetcher::new()), clock)
            .context("failed to create cache agent")?,
    );
    let report = agent.install().await.context("install failed")?;
    if !report.failed.is_empty() {
        warn!("Precache skipped {} entries: {:?}", report.failed.len(), report.failed);
    }

    let (control, control_handle) = spawn_control_channel(agent.clone(), CONTROL_CAPACITY);
    let tasks = vec![
        control_handle,
        spawn_sweep_task(agent.clone(), config.sweep_interval),
        spawn_sweep_task(service.clone(), config.sweep_interval),
    ];
    info!("Background tasks started");

    let app = create_router(AppState::new(agent, service, control));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(tasks))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the background tasks and allows graceful shutdown.
async fn shutdown_signal(tasks: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    for task in &tasks {
        task.abort();
    }
    warn!("Background tasks aborted");
}

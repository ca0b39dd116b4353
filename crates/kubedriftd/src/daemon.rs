//! Daemon wiring: store, scraper loop, and API server.

use std::sync::Arc;

use anyhow::Context;
use kubedrift_drift::DriftRecorder;
use kubedrift_scraper::{ApiServerClient, Scraper};
use kubedrift_store::DriftStore;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::Settings;

/// Store file name inside the data directory.
pub const STORE_FILE: &str = "kubedrift.redb";

pub async fn run(settings: Settings) -> anyhow::Result<()> {
    info!("kubedrift daemon starting");

    std::fs::create_dir_all(&settings.data_dir)
        .with_context(|| format!("creating data dir {}", settings.data_dir.display()))?;
    let db_path = settings.data_dir.join(STORE_FILE);

    // Without a store there is nothing to do; refuse to start.
    let store = DriftStore::open(&db_path)
        .with_context(|| format!("opening store at {}", db_path.display()))?;
    info!(path = ?db_path, "store opened");

    let mut client = ApiServerClient::new(&settings.api_server)?;
    if let Some(token) = settings.token {
        client = client.with_token(token);
    }
    info!(api_server = %client.authority(), "cluster client configured");

    let scraper = Arc::new(Scraper::new(
        client,
        store.clone(),
        Arc::new(settings.allow_list),
        settings.scrape,
    ));
    let recorder = DriftRecorder::new(store.clone(), settings.flatten);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let scraper_handle = tokio::spawn(scraper.run(shutdown_rx));

    // ── Start API server ───────────────────────────────────────

    let router = kubedrift_api::build_router(store, recorder);
    let listener = tokio::net::TcpListener::bind(settings.listen)
        .await
        .with_context(|| format!("binding {}", settings.listen))?;
    info!(addr = %settings.listen, "API server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c; running until killed");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = scraper_handle.await;

    info!("kubedrift daemon stopped");
    Ok(())
}

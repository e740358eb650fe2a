//! Panel binary crate: CLI, tracing bootstrap, HTTP surface and the
//! subscription auto-updater wired around the probing engine.

pub mod cli;
pub mod http;
pub mod refresh;
pub mod state;
pub mod tracing_init;

use anyhow::{Context, Result};
use cli::Cli;
use sbp_core::{ProbeEngine, SqliteStore};
use state::AppState;
use std::sync::Arc;
use tracing::info;

pub async fn run(cli: Cli) -> Result<()> {
    tracing_init::init_tracing_once(&cli.log_level);

    let store = Arc::new(
        SqliteStore::open(&cli.db)
            .await
            .with_context(|| format!("opening database {}", cli.db))?,
    );
    // The proxy runtime registers its outbound adapters here when the panel
    // is embedded next to it; standalone, SOCKS5 rows are still fully
    // probeable and everything else gets reachability checks only.
    let engine = ProbeEngine::new(store.clone(), None);
    let state = AppState::new(store, engine, cli.insecure_subs);

    if !cli.no_auto_update {
        refresh::spawn_auto_update(state.clone(), state.shutdown.child_token());
    }

    let addr = format!("{}:{}", cli.listen, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, "web server listening");

    let shutdown = state.shutdown.clone();
    let app = http::router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
            shutdown.cancel();
        })
        .await
        .context("http server failed")?;
    Ok(())
}

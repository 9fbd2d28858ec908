//! freegame-notifier: binary entrypoint.
//! Loads configuration, hydrates sources from the store, then runs the per-source scheduler
//! next to the admin HTTP server until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;

use freegame_notifier::config::{NotifierConfig, Secrets};
use freegame_notifier::metrics::Metrics;
use freegame_notifier::{api, telemetry, AppContext, Scheduler, Shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    telemetry::init();

    let cfg = NotifierConfig::load_default().context("loading notifier config")?;
    let secrets = Secrets::from_env();
    tracing::info!(sources = cfg.sources.len(), ?secrets, "configuration loaded");

    let metrics = Metrics::init()?;
    let ctx = Arc::new(AppContext::from_config(&cfg, &secrets).await?);
    ctx.hydrate_from_store().await;

    let shutdown = Shutdown::new();
    let scheduler = tokio::spawn(Scheduler::new(ctx.clone()).run(shutdown.clone()));

    let app = api::router(ctx.clone()).merge(metrics.router());
    let listener = tokio::net::TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("binding {}", cfg.http.bind))?;
    tracing::info!(addr = %cfg.http.bind, "admin surface listening");

    let stop = shutdown.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("ctrl-c handler failed: {e}");
        }
        stop.trigger();
    });
    if let Err(e) = server.await {
        tracing::error!("admin server failed: {e}");
        shutdown.trigger();
    }

    scheduler.await.context("scheduler task")?;
    tracing::info!("bye");
    Ok(())
}

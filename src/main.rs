//! forum-recon binary entrypoint.
//! Loads configuration, wires the orchestrator, and serves the JSON API.

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use forum_recon::{build_orchestrator, metrics::Metrics, router, scheduler, EngineConfig};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("forum_recon=info,tower_http=warn"));

    let json = std::env::var("FORUM_RECON_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = EngineConfig::load_default().context("loading engine config")?;
    let metrics = Metrics::init()?;
    let orchestrator = build_orchestrator(&cfg).await?;

    if cfg.schedule.interval_secs > 0 {
        scheduler::spawn_scan_scheduler(orchestrator.clone(), cfg.schedule.interval_secs);
        tracing::info!(interval_secs = cfg.schedule.interval_secs, "scan scheduler enabled");
    }

    let app = router(orchestrator).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, "forum-recon listening");
    axum::serve(listener, app).await.context("serving HTTP")?;
    Ok(())
}

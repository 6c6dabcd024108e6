//! Driver Monitor - Main Entry Point

use api::{init_logging, run_server, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_logging(&settings.logging)?;

    info!("=== Driver Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Episode thresholds: closed<{} open>={} warning={}ms critical={}ms",
        settings.dms.episode.closed_threshold,
        settings.dms.episode.open_threshold,
        settings.dms.episode.warning_after_ms,
        settings.dms.episode.critical_after_ms,
    );

    run_server(settings).await
}

//! Helpdesk Bot - Main entry point.

use anyhow::Result;
use helpdesk_bot::start_bot;
use helpdesk_common::config::Config;
use helpdesk_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Refuses to start without both secrets
    let config = Config::load_and_validate()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Helpdesk Bot v{}", env!("CARGO_PKG_VERSION"));
    config.provenance.log();

    start_bot(&config).await
}

//! Service entry point.
//!
//! Loads `.env`, reads and validates the configuration, installs the tracing
//! subscriber, and hands over to [`linktrail::server::run`].

use anyhow::Result;
use linktrail::config::{self, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_from_env()?;
    init_tracing(&config);

    config.print_summary();

    linktrail::server::run(config).await
}

/// Installs the global subscriber: `LOG_FORMAT=json` for structured output,
/// human-readable text otherwise. `RUST_LOG` controls the filter.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if config.log_format == "json" {
        builder.json().with_current_span(true).init();
    } else {
        builder.with_target(false).init();
    }
}

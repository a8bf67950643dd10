//! Tracing subscriber setup.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber.
///
/// `--debug` wins over the configured level; otherwise `RUST_LOG` wins over
/// the configured level.
pub fn init_logging(config: &LoggingConfig, debug: bool) -> Result<()> {
    let env_filter = filter_for(&config.level, debug);

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_target(true).with_line_number(true))
            .try_init()?,
        _ => registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .try_init()?,
    }

    Ok(())
}

fn filter_for(level: &str, debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new(
            "zkminer=debug,zkminer_node=debug,zkminer_chain=debug,zkminer_prover=debug,tower_http=debug",
        )
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "zkminer={level},zkminer_node={level},zkminer_chain={level},zkminer_prover={level},tower_http=info"
            ))
        })
    }
}

//! Tracing subscriber setup for the binary

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for a `-v` count
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "churnflow=warn",
        1 => "churnflow=info",
        2 => "churnflow=debug",
        _ => "churnflow=trace",
    }
}

/// Initialize logging to stderr. `RUST_LOG` overrides the verbosity flag.
pub fn init_logging(verbosity: u8) -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive(verbosity).into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    Ok(())
}

// src/logging.rs
//
// Process-wide log setup, done once at startup by the binary. Library code
// only emits `tracing` events inside per-stage spans.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Filter directive for a `-v` count: none = info, `-v` = debug, `-vv` = trace.
///
/// Fetch metadata is reported at info, so the default keeps it visible.
pub fn level_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the stderr subscriber. `RUST_LOG` overrides the verbosity flag.
pub fn init(verbose: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for_verbosity(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {}", e))?;

    // Bridge `log` records from dependencies; harmless if already bridged.
    tracing_log::LogTracer::init().ok();
    Ok(())
}

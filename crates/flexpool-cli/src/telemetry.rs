//! Console logging for the `flexpool` binary.
//!
//! The library emits its own events through the `tracing` feature; this
//! module installs the subscriber that prints them. Verbosity follows
//! `RUST_LOG` and defaults to `info`, e.g. `RUST_LOG=flexpool=trace` shows
//! every worker thread starting and stopping.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_names(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339()),
        )
        .try_init()?;

    Ok(())
}

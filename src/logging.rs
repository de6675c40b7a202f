use std::env;
use tracing::debug;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the stderr subscriber. Level comes from `BILLING_LOG`, then `RUST_LOG`, default `info`.
pub fn init_logger(verbose: bool) {
    let filter = env::var("BILLING_LOG")
        .or_else(|_| env::var("RUST_LOG"))
        .unwrap_or_else(|_| if verbose { "debug" } else { "info" }.to_string());
    let filter_layer = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(filter_layer)
        .try_init();

    debug!(filter = %filter, "logging initialised");
}

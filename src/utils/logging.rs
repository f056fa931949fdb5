// src/utils/logging.rs
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the extractor logs at `info`, or at
/// `debug` when `verbose` is on so per-row diagnostics become visible.
pub fn setup_logging(verbose: bool) {
    let fallback = if verbose {
        "rice_price_extractor=debug,info"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    fmt().with_env_filter(filter).with_target(false).init();

    tracing::debug!("Logging setup complete (verbose: {}).", verbose);
}

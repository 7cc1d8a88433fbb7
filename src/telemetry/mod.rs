//! Tracing subscriber setup for binaries and tests.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! the embedding application's choice. [`init`] wires up the conventional
//! stack: an env-filtered fmt layer plus span-trace capture for diagnostics.

use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the default subscriber: `RUST_LOG`-style filtering (falling back
/// to `info`), human-readable output on stderr, and span traces for error
/// reports.
///
/// Safe to call more than once; later calls are ignored if a global
/// subscriber is already set.
pub fn init() {
    init_with_filter("info");
}

/// Like [`init`], but with an explicit fallback filter directive used when
/// the environment does not provide one.
pub fn init_with_filter(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(ErrorLayer::default())
        .try_init();
}

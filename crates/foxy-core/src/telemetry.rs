//! Minimal tracing setup: a `tracing_subscriber::registry()` composed with
//! an env-filtered `fmt` layer, without a custom high-throughput batching
//! writer — a forward proxy's log volume doesn't warrant one.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Install a process-wide `tracing` subscriber that honors `RUST_LOG`,
/// defaulting to `info` when unset. Intended to be called once, near the top
/// of a binary's `main`; calling it twice is a programmer error and will
/// panic, matching `tracing`'s own global-subscriber contract.
pub fn init() {
	tracing_subscriber::registry()
		.with(fmt::layer())
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();
}

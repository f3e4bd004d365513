//! Ambient stack shared by the `foxy` proxy crate: error building blocks,
//! a graceful-drain primitive for the listener, and tracing setup.
//!
//! Nothing in this crate knows about HTTP or proxying.

pub mod drain;
pub mod error;
pub mod telemetry;

pub mod prelude {
	pub use std::sync::Arc;
	pub use std::time::{Duration, Instant};

	pub use tracing::{debug, error, info, trace, warn};

	pub use crate::error::is_transport_closed;
}

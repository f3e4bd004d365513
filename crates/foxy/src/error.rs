//! The crate's closed error taxonomy.
//!
//! Kept small and flat rather than mirroring the original's per-operation
//! `boost::system::error_code` values: callers care about which of a handful
//! of things went wrong (bad input, peer misbehaved, timed out, transport
//! broke, TLS broke), not which internal op produced it.

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
	/// The underlying TCP/TLS stream failed or was closed unexpectedly.
	#[error("transport error: {0}")]
	Transport(#[source] std::io::Error),

	/// A peer sent something that doesn't conform to HTTP/1.1.
	#[error("protocol error: {0}")]
	Protocol(String),

	/// A session or relay operation exceeded its configured timeout.
	#[error("operation timed out")]
	TimedOut,

	/// A URI or request-target failed to parse, or a percent-encoded octet
	/// sequence was malformed. `offset` is the byte position of the first
	/// offending `%` within the input that was being decoded.
	#[error("malformed percent-encoding at byte {offset}")]
	UnexpectedPct { offset: usize },

	/// A URI failed structural validation (scheme/authority/path grammar).
	#[error("malformed uri: {0}")]
	Uri(String),

	/// TLS handshake or record-layer failure.
	#[error("tls error: {0}")]
	Tls(#[source] rustls::Error),
}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Self {
		Error::Transport(e)
	}
}

impl From<rustls::Error> for Error {
	fn from(e: rustls::Error) -> Self {
		Error::Tls(e)
	}
}

pub type Result<T> = std::result::Result<T, Error>;

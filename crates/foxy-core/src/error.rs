//! Shared error-classification helpers.
//!
//! The timed-op wrapper and the RFC 7230 §6.6 teardown sequence both need to
//! ask "did the peer just go away" without caring whether the answer came
//! from a plain `std::io::Error` or a TLS shutdown. This is the one place
//! that question is answered.

use std::io;

/// True for the family of I/O errors that mean "the transport is gone",
/// whether because we closed it ourselves (timeout, teardown) or the peer
/// did (reset, broken pipe, EOF-as-error).
pub fn is_transport_closed(err: &io::Error) -> bool {
	matches!(
		err.kind(),
		io::ErrorKind::ConnectionReset
			| io::ErrorKind::ConnectionAborted
			| io::ErrorKind::BrokenPipe
			| io::ErrorKind::NotConnected
			| io::ErrorKind::UnexpectedEof
	)
}

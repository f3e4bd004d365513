//! The accepting half of a session: detect whether the first bytes off the
//! wire are a TLS handshake, optionally upgrade, and tear down per RFC 7230
//! §6.6.
//!
//! Grounded on `impl/server_session/async_detect_ssl.impl.hpp`,
//! `impl/server_session/async_handshake.impl.hpp`, and
//! `impl/server_session/async_shutdown.impl.hpp`.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::Error;
use crate::session::timed_op::timed_op;
use crate::session::{Session, SessionOptions};
use crate::stream::{MultiStream, TlsSide};

/// Bytes drained after half-closing the write side but before half-closing
/// the read side, giving the peer's own in-flight bytes somewhere to land
/// instead of producing a connection reset. Matches the original's fixed
/// 1024-byte drain budget.
const DRAIN_BUDGET: usize = 1024;

/// A session accepted from a listener.
pub struct ServerSession {
	pub inner: Session,
}

impl ServerSession {
	pub fn new(stream: TcpStream, opts: SessionOptions) -> Self {
		ServerSession {
			inner: Session::new(MultiStream::Plain(stream), opts),
		}
	}

	/// Peek at the first byte of the connection and classify it as a TLS
	/// handshake (`0x16`, TLS record type `handshake`) or not, per the
	/// content-type heuristic in `async_detect_ssl.impl.hpp`. The peeked
	/// byte is retained in `inner.buffer` so [`Self::async_handshake`] (or
	/// plaintext request parsing) doesn't lose it.
	pub async fn async_detect_ssl(&mut self) -> Result<bool, Error> {
		let timeout = self.inner.opts.timeout;
		let MultiStream::Plain(tcp) = &mut self.inner.stream else {
			return Ok(true);
		};
		let mut byte = [0u8; 1];
		timed_op(timeout, async { tcp.peek(&mut byte).await.map_err(Error::from) }).await?;
		Ok(byte[0] == 0x16)
	}

	/// Upgrade the connection to TLS using `opts.server_tls_config`. Must
	/// only be called when [`Self::async_detect_ssl`] returned `true`.
	pub async fn async_handshake(mut self) -> Result<Self, Error> {
		let timeout = self.inner.opts.timeout;
		let config = self
			.inner
			.opts
			.server_tls_config
			.clone()
			.ok_or_else(|| Error::Protocol("TLS connection but no server TLS config configured".into()))?;
		let MultiStream::Plain(tcp) = self.inner.stream else {
			return Err(Error::Protocol("already upgraded".into()));
		};
		let acceptor = tokio_rustls::TlsAcceptor::from(config);
		let tls = timed_op(timeout, async {
			acceptor.accept(tcp).await.map_err(Error::from)
		})
		.await?;
		self.inner.stream = MultiStream::Tls(TlsSide::Server(tls));
		Ok(self)
	}

	/// RFC 7230 §6.6 graceful close: half-close the write side, drain up to
	/// [`DRAIN_BUDGET`] bytes of whatever the peer still has in flight,
	/// half-close the read side, then fully close.
	pub async fn async_shutdown(mut self) -> Result<(), Error> {
		let timeout = self.inner.opts.timeout;

		if let MultiStream::Tls(_) = &self.inner.stream {
			timed_op(timeout, async { self.inner.stream.shutdown().await.map_err(Error::from) }).await?;
			return Ok(());
		}

		let MultiStream::Plain(tcp) = self.inner.stream else {
			unreachable!("TLS case handled above");
		};
		timed_op(timeout, async { shutdown_then_drain(tcp, DRAIN_BUDGET).await }).await
	}
}

/// Shared `shutdown-send, drain, shutdown-receive, close` sequence, pulled
/// out so it's testable against a plain [`TcpStream`] without going through
/// [`ServerSession`]'s TLS branch.
///
/// Tokio's `TcpStream` only exposes a write-side `shutdown` through
/// `AsyncWriteExt` (no `std::net::Shutdown` argument); half-closing either
/// direction individually requires dropping down to the std socket via
/// `into_std`/`from_std`, which round-trip the same underlying fd rather
/// than duplicating it.
async fn shutdown_then_drain(tcp: TcpStream, budget: usize) -> Result<(), Error> {
	use std::net::Shutdown;

	let std_stream = tcp.into_std()?;
	std_stream.shutdown(Shutdown::Write)?;
	let tcp = TcpStream::from_std(std_stream)?;

	let mut remaining = budget;
	let mut buf = [0u8; 256];
	loop {
		if remaining == 0 {
			break;
		}
		let want = remaining.min(buf.len());
		match tcp.try_read(&mut buf[..want]) {
			Ok(0) => break,
			Ok(n) => remaining -= n,
			Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
				// Give the peer a brief window to flush its own
				// trailing bytes, then stop waiting.
				match tokio::time::timeout(std::time::Duration::from_millis(50), tcp.readable()).await {
					Ok(Ok(())) => continue,
					_ => break,
				}
			}
			Err(e) => return Err(Error::from(e)),
		}
	}

	let std_stream = tcp.into_std()?;
	std_stream.shutdown(Shutdown::Read)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::session::SessionOptions;
	use tokio::net::TcpListener;

	#[tokio::test]
	async fn detect_ssl_false_for_plaintext_request() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();

		let client = tokio::spawn(async move {
			let mut s = TcpStream::connect(addr).await.unwrap();
			s.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
			s
		});

		let (tcp, _) = listener.accept().await.unwrap();
		let mut session = ServerSession::new(tcp, SessionOptions::default());
		assert!(!session.async_detect_ssl().await.unwrap());
		let _keep_alive = client.await.unwrap();
	}

	#[tokio::test]
	async fn graceful_shutdown_half_closes_then_closes() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();

		let client = tokio::spawn(async move {
			let mut s = TcpStream::connect(addr).await.unwrap();
			let mut buf = [0u8; 16];
			let n = s.read(&mut buf).await.unwrap();
			n
		});

		let (tcp, _) = listener.accept().await.unwrap();
		let session = ServerSession::new(tcp, SessionOptions::default());
		session.async_shutdown().await.unwrap();

		let n = client.await.unwrap();
		assert_eq!(n, 0);
	}
}

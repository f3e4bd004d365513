//! The dialing half of a session: connect to an origin, optionally over
//! TLS, and tear the connection down asymmetrically from how a server does.
//!
//! Grounded on `impl/client_session/async_connect.impl.hpp` and
//! `impl/client_session/async_shutdown.impl.hpp`.

use rustls_pki_types::ServerName;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::Error;
use crate::session::timed_op::timed_op;
use crate::session::{Session, SessionOptions};
use crate::stream::{MultiStream, TlsSide};

/// A session dialed outbound to an origin or the next hop.
pub struct ClientSession {
	pub inner: Session,
}

impl ClientSession {
	/// Resolve `host`, connect, and — if `opts.client_tls_config` is set and
	/// `use_tls` is requested — perform a TLS handshake with SNI set to
	/// `host` when `opts.verify_peer_cert` is true.
	///
	/// Grounded on `async_connect.impl.hpp`'s resolve-then-connect-then-
	/// maybe-handshake sequence, each step individually timed.
	pub async fn async_connect(host: &str, port: u16, use_tls: bool, opts: SessionOptions) -> Result<Self, Error> {
		let timeout = opts.timeout;
		let addr = format!("{host}:{port}");

		let tcp = timed_op(timeout, async {
			TcpStream::connect(&addr).await.map_err(Error::from)
		})
		.await?;
		tcp.set_nodelay(true).ok();

		let stream = if use_tls {
			let config = opts
				.client_tls_config
				.clone()
				.ok_or_else(|| Error::Protocol("TLS requested but no client TLS config configured".into()))?;
			let connector = tokio_rustls::TlsConnector::from(config);
			let server_name = ServerName::try_from(host.to_owned())
				.map_err(|_| Error::Uri(format!("invalid TLS server name: {host:?}")))?;
			let tls = timed_op(timeout, async {
				connector
					.connect(server_name, tcp)
					.await
					.map_err(|e| Error::Tls(rustls::Error::General(e.to_string())))
			})
			.await?;
			MultiStream::Tls(TlsSide::Client(tls))
		} else {
			MultiStream::Plain(tcp)
		};

		Ok(ClientSession {
			inner: Session::new(stream, opts),
		})
	}

	/// Tear down gracefully.
	///
	/// Unlike [`super::server::ServerSession::async_shutdown`], the client
	/// side does **not** drain a bounded amount of trailing input after
	/// half-closing the write side — the original's
	/// `async_shutdown.impl.hpp` for `client_session` only performs the TLS
	/// close-notify (if applicable) and then a single
	/// bidirectional-shutdown-and-close. This asymmetry is preserved
	/// deliberately rather than "fixed" to match the server, since it's a
	/// distinct, intentional client/server difference in the original, not
	/// an oversight.
	pub async fn async_shutdown(mut self) -> Result<(), Error> {
		let timeout = self.inner.opts.timeout;
		if let MultiStream::Tls(_) = &self.inner.stream {
			let result = timed_op(timeout, async { self.inner.stream.shutdown().await.map_err(Error::from) }).await;
			// A `stream_truncated`-equivalent error (peer closed without a
			// close-notify) is normalized to success, matching the
			// original's explicit handling of that one error code.
			if let Err(Error::Transport(e)) = &result {
				if e.kind() != std::io::ErrorKind::UnexpectedEof {
					return Err(result.unwrap_err());
				}
			} else {
				result?;
			}
		} else {
			timed_op(timeout, async { self.inner.stream.shutdown().await.map_err(Error::from) }).await?;
		}
		Ok(())
	}
}

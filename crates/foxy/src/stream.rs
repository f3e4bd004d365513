//! A single stream type spanning plain TCP and TLS-over-TCP, so the rest of
//! the crate can hold one concrete type regardless of which scheme a
//! session ended up speaking.
//!
//! Grounded on `proxy::stream::Socket`/`SocketType`, which plays the same
//! "erase transport, keep `AsyncRead`/`AsyncWrite`" role for its
//! Plain/Tls/Hbone/Boxed variants. This crate only ever needs two variants
//! (the original's `multi_stream.hpp` is likewise a plain/TLS union, with
//! no equivalent of HBONE).

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream as ServerTlsStream;
use tokio_rustls::client::TlsStream as ClientTlsStream;

/// Either side of a TLS connection, since client and server session types
/// each produce a differently-typed `tokio_rustls` stream.
pub enum TlsSide {
	Server(ServerTlsStream<TcpStream>),
	Client(ClientTlsStream<TcpStream>),
}

/// A TCP stream that is either plain or wrapped in TLS.
///
/// Exposes a single `AsyncRead`/`AsyncWrite` surface so callers (the relay
/// engine, the tunnel dispatcher) never need to know which.
pub enum MultiStream {
	Plain(TcpStream),
	Tls(TlsSide),
}

impl MultiStream {
	pub fn is_tls(&self) -> bool {
		matches!(self, MultiStream::Tls(_))
	}

	/// The peer address of the underlying TCP stream, regardless of TLS.
	pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
		match self {
			MultiStream::Plain(s) => s.peer_addr(),
			MultiStream::Tls(TlsSide::Server(s)) => s.get_ref().0.peer_addr(),
			MultiStream::Tls(TlsSide::Client(s)) => s.get_ref().0.peer_addr(),
		}
	}
}

impl AsyncRead for MultiStream {
	fn poll_read(
		self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &mut ReadBuf<'_>,
	) -> Poll<std::io::Result<()>> {
		match self.get_mut() {
			MultiStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
			MultiStream::Tls(TlsSide::Server(s)) => Pin::new(s).poll_read(cx, buf),
			MultiStream::Tls(TlsSide::Client(s)) => Pin::new(s).poll_read(cx, buf),
		}
	}
}

impl AsyncWrite for MultiStream {
	fn poll_write(
		self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &[u8],
	) -> Poll<std::io::Result<usize>> {
		match self.get_mut() {
			MultiStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
			MultiStream::Tls(TlsSide::Server(s)) => Pin::new(s).poll_write(cx, buf),
			MultiStream::Tls(TlsSide::Client(s)) => Pin::new(s).poll_write(cx, buf),
		}
	}

	fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
		match self.get_mut() {
			MultiStream::Plain(s) => Pin::new(s).poll_flush(cx),
			MultiStream::Tls(TlsSide::Server(s)) => Pin::new(s).poll_flush(cx),
			MultiStream::Tls(TlsSide::Client(s)) => Pin::new(s).poll_flush(cx),
		}
	}

	fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
		match self.get_mut() {
			MultiStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
			MultiStream::Tls(TlsSide::Server(s)) => Pin::new(s).poll_shutdown(cx),
			MultiStream::Tls(TlsSide::Client(s)) => Pin::new(s).poll_shutdown(cx),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn plain_stream_round_trips() {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();

		let accept = tokio::spawn(async move {
			let (stream, _) = listener.accept().await.unwrap();
			MultiStream::Plain(stream)
		});

		let client = TcpStream::connect(addr).await.unwrap();
		let mut server = accept.await.unwrap();
		let mut client = MultiStream::Plain(client);

		assert!(!server.is_tls());
		assert!(!client.is_tls());

		use tokio::io::{AsyncReadExt, AsyncWriteExt};
		client.write_all(b"ping").await.unwrap();
		let mut buf = [0u8; 4];
		server.read_exact(&mut buf).await.unwrap();
		assert_eq!(&buf, b"ping");
	}
}

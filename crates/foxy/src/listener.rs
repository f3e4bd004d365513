//! Accepts connections and spawns one tunnel dispatcher per connection,
//! with graceful shutdown of the accept loop.
//!
//! Grounded on `listener.hpp`'s `accept_op`/`server_op` (accept, spawn,
//! repeat, until `shutdown()` cancels the acceptor) and on
//! `gateway::Gateway::run`/`run_bind` (`JoinSet` of per-connection tasks,
//! `tokio::select!` against a [`foxy_core::drain::DrainWatcher`]).

use tokio::net::TcpListener as TokioTcpListener;
use tokio::task::JoinSet;

use foxy_core::drain;
use foxy_core::prelude::*;

use crate::error::Error;
use crate::session::server::ServerSession;
use crate::session::SessionOptions;

/// Constructor surface for [`Listener`], modeled on `Bind`/`Gateway`
/// configuration structs that separate bind address and per-session options
/// from the listener value itself.
#[derive(Clone)]
pub struct ListenerOptions {
	pub bind_addr: std::net::SocketAddr,
	pub session_opts: SessionOptions,
	pub origin_opts: SessionOptions,
}

/// Accepts client connections on `bind_addr` and dispatches each to
/// [`crate::tunnel::dispatch`] on its own task.
pub struct Listener {
	opts: ListenerOptions,
	tcp_listener: TokioTcpListener,
	watcher: drain::DrainWatcher,
}

/// Caller-held handle that shuts a [`Listener`] down: signals the accept
/// loop to stop taking new connections and waits for every in-flight
/// connection task to release its own watcher clone.
///
/// Split out from [`Listener`] itself because [`drain::DrainTrigger::drain`]
/// consumes `self` to wait on the paired channel, which wouldn't be
/// possible if it lived inside the `Listener` value that `async_accept`
/// also consumes. Mirrors `listener.hpp`'s `shutdown()`, which likewise
/// cancels the acceptor's outstanding `async_accept` from outside the
/// listener object.
pub struct ListenerShutdown {
	trigger: drain::DrainTrigger,
}

impl ListenerShutdown {
	pub async fn shutdown(self) {
		self.trigger.drain().await;
	}
}

impl Listener {
	/// Bind `opts.bind_addr`. Use [`Self::local_addr`] afterward to read
	/// back the actual port when `bind_addr`'s port was `0`.
	pub async fn bind(opts: ListenerOptions) -> Result<(Self, ListenerShutdown), Error> {
		let tcp_listener = TokioTcpListener::bind(opts.bind_addr).await?;
		let (trigger, watcher) = drain::new();
		Ok((
			Listener {
				opts,
				tcp_listener,
				watcher,
			},
			ListenerShutdown { trigger },
		))
	}

	pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
		self.tcp_listener.local_addr()
	}

	/// Run the accept loop until its paired [`ListenerShutdown::shutdown`]
	/// is called or the listener socket errors out.
	pub async fn async_accept(self) -> Result<(), Error> {
		let tcp_listener = self.tcp_listener;
		info!(addr = %self.opts.bind_addr, "listening");

		let mut tasks = JoinSet::new();
		let mut watcher = self.watcher.clone();

		loop {
			tokio::select! {
				biased;

				_ = watcher.signaled() => {
					debug!("listener shutting down, draining in-flight connections");
					break;
				}
				accepted = tcp_listener.accept() => {
					let (tcp, peer) = match accepted {
						Ok(pair) => pair,
						Err(e) => {
							warn!(error = %e, "accept failed");
							continue;
						}
					};
					trace!(%peer, "accepted connection");

					let session_opts = self.opts.session_opts.clone();
					let origin_opts = self.opts.origin_opts.clone();
					let conn_watcher = self.watcher.clone();

					tasks.spawn(async move {
						let _conn_watcher = conn_watcher;
						let has_tls_config = session_opts.server_tls_config.is_some();
						let mut client = ServerSession::new(tcp, session_opts);

						if has_tls_config {
							let is_tls = match client.async_detect_ssl().await {
								Ok(is_tls) => is_tls,
								Err(e) => {
									debug!(%peer, error = %e, "TLS detection failed");
									return;
								}
							};
							if is_tls {
								client = match client.async_handshake().await {
									Ok(client) => client,
									Err(e) => {
										debug!(%peer, error = %e, "TLS handshake failed");
										return;
									}
								};
							}
						}

						if let Err(e) = crate::tunnel::dispatch(client, origin_opts).await {
							debug!(%peer, error = %e, "connection ended with error");
						}
					});
				}
			}
		}

		drop(tcp_listener);
		while tasks.join_next().await.is_some() {}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};
	use tokio::net::TcpStream;

	#[tokio::test]
	async fn rejects_malformed_request_with_400() {
		let opts = ListenerOptions {
			bind_addr: "127.0.0.1:0".parse().unwrap(),
			session_opts: SessionOptions::default(),
			origin_opts: SessionOptions::default(),
		};

		let (listener, _shutdown) = Listener::bind(opts).await.unwrap();
		let addr = listener.local_addr().unwrap();

		let server = tokio::spawn(async move { listener.async_accept().await });

		let mut stream = TcpStream::connect(addr).await.unwrap();
		stream.write_all(b"not a valid request line\r\n\r\n").await.unwrap();

		let mut buf = vec![0u8; 512];
		let n = stream.read(&mut buf).await.unwrap();
		let text = String::from_utf8_lossy(&buf[..n]);
		assert!(text.starts_with("HTTP/1.1 400"));

		// The accept loop only exits on a shutdown signal or socket error,
		// neither of which this test triggers; cancel the task rather than
		// wait for it.
		server.abort();
	}

	#[tokio::test]
	async fn shutdown_stops_the_accept_loop() {
		let opts = ListenerOptions {
			bind_addr: "127.0.0.1:0".parse().unwrap(),
			session_opts: SessionOptions::default(),
			origin_opts: SessionOptions::default(),
		};

		let (listener, shutdown) = Listener::bind(opts).await.unwrap();
		let server = tokio::spawn(async move { listener.async_accept().await });

		shutdown.shutdown().await;
		server.await.unwrap().unwrap();
	}
}

//! The tunnel dispatcher: classifies one incoming request-target and routes
//! it to a rejection, a CONNECT tunnel, or a one-shot absolute-URI relay.
//!
//! Grounded on `detail/tunnel.hpp`. That file's own CONNECT branch never
//! gets implemented — it always falls through to a 400 response unless the
//! target is absolute-form HTTP. This crate implements CONNECT for real:
//! dial the requested origin, answer `200 Connection Established`, then
//! relay bytes bidirectionally until either side closes.

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;

use crate::error::Error;
use crate::message::HttparseCodec;
use crate::relay::{is_close_requested, relay_parsed_request, relay_response};
use crate::session::client::ClientSession;
use crate::session::server::ServerSession;
use crate::session::{Session, SessionOptions};
use crate::uri;

const MALFORMED_REQUEST_BODY: &str = "Malformed client request. Use either CONNECT <authority-uri> or <verb> <absolute-uri>";
const CONNECT_NOT_PERSISTENT_BODY: &str = "CONNECT semantics require a persistent connection\n\n";

const MAX_HEADER_WAIT: usize = 64 * 1024;

/// Read request-line + headers off `session` without consuming anything
/// past the header from its buffer.
async fn read_request_header(session: &mut Session) -> Result<crate::message::ParsedRequest, Error> {
	loop {
		if let Some(parsed) = HttparseCodec::try_parse_request(&session.buffer)? {
			bytes::Buf::advance(&mut session.buffer, parsed.header_len);
			return Ok(parsed);
		}
		if session.buffer.len() > MAX_HEADER_WAIT {
			return Err(Error::Protocol("request header too large".into()));
		}
		let mut chunk = [0u8; 4096];
		let n = session.timed_read(&mut chunk).await?;
		if n == 0 {
			return Err(Error::Protocol("connection closed before request header".into()));
		}
		session.buffer.extend_from_slice(&chunk[..n]);
	}
}

async fn write_simple_response(session: &mut Session, status: u16, reason: &str, body: &str) -> Result<(), Error> {
	let mut out = BytesMut::new();
	out.extend_from_slice(format!("HTTP/1.1 {status} {reason}\r\n").as_bytes());
	out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
	out.extend_from_slice(b"Connection: close\r\n\r\n");
	out.extend_from_slice(body.as_bytes());
	session.timed_write_all(&out).await?;
	Ok(())
}

/// Drive one client connection end to end: read its request, classify the
/// target, dispatch, then tear the client side down gracefully. Runs in a
/// loop so a keep-alive absolute-form relay can serve more than one request
/// per connection.
pub async fn dispatch(client: ServerSession, origin_opts: SessionOptions) -> Result<(), Error> {
	let mut client = client;

	loop {
		let parsed = match read_request_header(&mut client.inner).await {
			Ok(p) => p,
			Err(_) => break,
		};

		if parsed.method == http::Method::CONNECT {
			let target = match uri::parse_authority(&parsed.target) {
				Ok(t) if t.is_authority() && !t.port.is_empty() => t,
				_ => {
					write_simple_response(&mut client.inner, 400, "Bad Request", MALFORMED_REQUEST_BODY).await?;
					break;
				}
			};
			if is_close_requested(&parsed.fields, parsed.version) {
				write_simple_response(&mut client.inner, 400, "Bad Request", CONNECT_NOT_PERSISTENT_BODY).await?;
				break;
			}
			let port: u16 = target
				.port
				.parse()
				.map_err(|_| Error::Uri(format!("invalid port: {:?}", target.port)))?;

			let upstream = match ClientSession::async_connect(target.host, port, false, origin_opts.clone()).await {
				Ok(s) => s,
				Err(_) => {
					write_simple_response(&mut client.inner, 502, "Bad Gateway", "could not connect to origin").await?;
					break;
				}
			};

			client
				.inner
				.timed_write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
				.await?;

			run_connect_tunnel(&mut client.inner, upstream.inner).await?;
			break;
		}

		let target = match uri::parse_uri(&parsed.target) {
			Ok(t) if t.is_absolute() && t.is_http() => t,
			_ => {
				write_simple_response(&mut client.inner, 400, "Bad Request", MALFORMED_REQUEST_BODY).await?;
				break;
			}
		};

		let host = target.host.to_owned();
		let port: u16 = if target.port.is_empty() {
			if target.scheme.eq_ignore_ascii_case("https") { 443 } else { 80 }
		} else {
			target
				.port
				.parse()
				.map_err(|_| Error::Uri(format!("invalid port: {:?}", target.port)))?
		};
		let use_tls = target.scheme.eq_ignore_ascii_case("https");
		let path = if target.path.is_empty() { "/".to_owned() } else { target.path.to_owned() };
		drop(target);

		// One-shot relay: force the request non-persistent and rewrite the
		// target down to just its path before relaying, per the original's
		// absolute-form handling in `detail/tunnel.hpp`.
		let mut parsed = parsed;
		parsed.target = path;
		parsed
			.fields
			.insert(http::header::CONNECTION, http::HeaderValue::from_static("close"));

		let mut upstream = match ClientSession::async_connect(&host, port, use_tls, origin_opts.clone()).await {
			Ok(s) => s,
			Err(_) => {
				write_simple_response(&mut client.inner, 502, "Bad Gateway", "could not connect to origin").await?;
				break;
			}
		};

		relay_parsed_request(&mut client.inner, &mut upstream.inner, parsed).await?;
		relay_response(&mut upstream.inner, &mut client.inner).await?;
		let _ = upstream.async_shutdown().await;
		break;
	}

	client.async_shutdown().await
}

/// Relay bytes in both directions between `client` and `upstream` until
/// either side closes or errors, per the CONNECT tunnel state machine.
async fn run_connect_tunnel(client: &mut Session, mut upstream: Session) -> Result<(), Error> {
	let mut client_buf = [0u8; 4096];
	let mut upstream_buf = [0u8; 4096];

	if !client.buffer.is_empty() {
		upstream.timed_write_all(&client.buffer).await?;
		client.buffer.clear();
	}

	loop {
		tokio::select! {
			result = client.timed_read(&mut client_buf) => {
				let n = result?;
				if n == 0 {
					let _ = upstream.stream.shutdown().await;
					return Ok(());
				}
				upstream.timed_write_all(&client_buf[..n]).await?;
			}
			result = upstream.timed_read(&mut upstream_buf) => {
				let n = result?;
				if n == 0 {
					let _ = client.stream.shutdown().await;
					return Ok(());
				}
				client.timed_write_all(&upstream_buf[..n]).await?;
			}
		}
	}
}

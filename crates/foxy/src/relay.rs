//! The relay engine: forwards one HTTP/1.1 message (request or response)
//! from one session to another, rewriting only what RFC 7230 requires an
//! intermediary to rewrite.
//!
//! Grounded on `detail/relay.hpp`, which does the same thing for both
//! directions of a proxied exchange: read a header, decide whether this
//! message closes the connection, move hop-by-hop fields out, stamp `Via`,
//! write the rewritten header, then copy the body through in bounded
//! chunks.

use bytes::{Buf, BytesMut};
use http::{HeaderMap, HeaderValue, Method, Version};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::Error;
use crate::fields::{add_foxy_via, export_connect_fields, has_foxy_via, set_connection_close};
use crate::message::{HeaderSink, HeaderSource, HttparseCodec, ParsedRequest, ParsedResponse};
use crate::session::Session;

/// Bytes moved per body read/write step. Matches the original's fixed
/// relay buffer size.
const RELAY_BUFFER: usize = 2048;

/// How a message's body is delimited, per RFC 7230 §3.3.3.
enum BodyMode {
	None,
	Chunked,
	ContentLength(u64),
	/// No framing header at all: body runs until the connection closes.
	/// Valid only for responses.
	UntilClose,
}

fn body_mode(fields: &HeaderMap, has_body_by_default: bool) -> Result<BodyMode, Error> {
	if let Some(te) = fields.get(http::header::TRANSFER_ENCODING) {
		let te = te.to_str().unwrap_or("");
		if te.to_ascii_lowercase().contains("chunked") {
			return Ok(BodyMode::Chunked);
		}
	}
	if let Some(cl) = fields.get(http::header::CONTENT_LENGTH) {
		let n: u64 = cl
			.to_str()
			.ok()
			.and_then(|s| s.parse().ok())
			.ok_or_else(|| Error::Protocol("invalid Content-Length".into()))?;
		return Ok(BodyMode::ContentLength(n));
	}
	if has_body_by_default {
		Ok(BodyMode::UntilClose)
	} else {
		Ok(BodyMode::None)
	}
}

/// Outcome of relaying one message: whether either side asked to end the
/// connection after this exchange.
pub struct RelayOutcome {
	pub close_tunnel: bool,
}

async fn fill_until<F>(session: &mut Session, mut is_complete: F) -> Result<usize, Error>
where
	F: FnMut(&[u8]) -> Option<usize>,
{
	loop {
		if let Some(header_len) = is_complete(&session.buffer) {
			return Ok(header_len);
		}
		let mut chunk = [0u8; RELAY_BUFFER];
		let n = session.timed_read(&mut chunk).await?;
		if n == 0 {
			return Err(Error::Protocol("connection closed mid-header".into()));
		}
		session.buffer.extend_from_slice(&chunk[..n]);
	}
}

async fn copy_body(src: &mut Session, dst: &mut Session, mode: &BodyMode) -> Result<(), Error> {
	match mode {
		BodyMode::None => Ok(()),
		BodyMode::ContentLength(mut remaining) => {
			while remaining > 0 {
				if src.buffer.is_empty() {
					let mut chunk = [0u8; RELAY_BUFFER];
					let want = remaining.min(RELAY_BUFFER as u64) as usize;
					let n = src.timed_read(&mut chunk[..want]).await?;
					if n == 0 {
						return Err(Error::Protocol("peer closed before body complete".into()));
					}
					dst.timed_write_all(&chunk[..n]).await?;
					remaining -= n as u64;
				} else {
					let take = (src.buffer.len() as u64).min(remaining) as usize;
					dst.timed_write_all(&src.buffer[..take]).await?;
					src.buffer.advance(take);
					remaining -= take as u64;
				}
			}
			Ok(())
		}
		BodyMode::UntilClose => {
			if !src.buffer.is_empty() {
				dst.timed_write_all(&src.buffer).await?;
				src.buffer.clear();
			}
			let mut chunk = [0u8; RELAY_BUFFER];
			loop {
				let n = src.timed_read(&mut chunk).await?;
				if n == 0 {
					return Ok(());
				}
				dst.timed_write_all(&chunk[..n]).await?;
			}
		}
		BodyMode::Chunked => {
			// Pass chunked framing through verbatim; we don't need to
			// understand individual chunk sizes, only where the terminating
			// `0\r\n\r\n` marker is, so trailers round-trip untouched too.
			loop {
				if let Some(end) = find_last_chunk(&src.buffer) {
					dst.timed_write_all(&src.buffer[..end]).await?;
					src.buffer.advance(end);
					return Ok(());
				}
				if src.buffer.len() > RELAY_BUFFER {
					let flush = src.buffer.len() - RELAY_BUFFER;
					dst.timed_write_all(&src.buffer[..flush]).await?;
					src.buffer.advance(flush);
				}
				let mut chunk = [0u8; RELAY_BUFFER];
				let n = src.timed_read(&mut chunk).await?;
				if n == 0 {
					return Err(Error::Protocol("peer closed mid-chunked-body".into()));
				}
				src.buffer.extend_from_slice(&chunk[..n]);
			}
		}
	}
}

fn find_last_chunk(buf: &[u8]) -> Option<usize> {
	buf.windows(5)
		.position(|w| w == b"0\r\n\r\n")
		.map(|i| i + 5)
}

/// Relay one request from `client` to `upstream`.
pub async fn relay_request(client: &mut Session, upstream: &mut Session) -> Result<RelayOutcome, Error> {
	let header_len = fill_until(client, |buf| match HttparseCodec::try_parse_request(buf) {
		Ok(Some(p)) => Some(p.header_len),
		_ => None,
	})
	.await?;
	let parsed: ParsedRequest = HttparseCodec::try_parse_request(&client.buffer[..header_len])?
		.ok_or_else(|| Error::Protocol("header disappeared".into()))?;
	client.buffer.advance(header_len);

	relay_parsed_request(client, upstream, parsed).await
}

/// Back half of [`relay_request`]: rewrite and forward an already-parsed
/// request whose header has already been consumed from `client`'s buffer.
///
/// Split out so the tunnel dispatcher's one-shot absolute-form path can
/// force `Connection: close` and rewrite the request-target down to just
/// its path *before* hop-by-hop stripping and body framing run, while still
/// going through the same rewrite-and-copy logic every other relayed
/// request does.
pub(crate) async fn relay_parsed_request(client: &mut Session, upstream: &mut Session, mut parsed: ParsedRequest) -> Result<RelayOutcome, Error> {
	if has_foxy_via(&parsed.fields) {
		// Already been through a foxy hop: this is a loop. Write nothing
		// upstream, leave the body unread, signal close.
		return Ok(RelayOutcome { close_tunnel: true });
	}

	let requested_close = is_close_requested(&parsed.fields, parsed.version);
	let close_tunnel = requested_close;

	let mode = body_mode(&parsed.fields, has_request_body_by_default(&parsed.method, &parsed.fields))?;

	let mut hop = HeaderMap::new();
	export_connect_fields(&mut parsed.fields, &mut hop);
	if close_tunnel {
		set_connection_close(&mut parsed.fields);
	}
	if matches!(mode, BodyMode::Chunked) {
		parsed
			.fields
			.insert(http::header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
	}
	add_foxy_via(&mut parsed.fields);

	let mut out = BytesMut::new();
	HttparseCodec::write_request(&parsed.method, &parsed.target, parsed.version, &parsed.fields, &mut out);
	upstream.timed_write_all(&out).await?;

	copy_body(client, upstream, &mode).await?;

	Ok(RelayOutcome { close_tunnel })
}

/// Relay one response from `upstream` back to `client`.
pub async fn relay_response(upstream: &mut Session, client: &mut Session) -> Result<RelayOutcome, Error> {
	let header_len = fill_until(upstream, |buf| match HttparseCodec::try_parse_response(buf) {
		Ok(Some(p)) => Some(p.header_len),
		_ => None,
	})
	.await?;
	let mut parsed: ParsedResponse = HttparseCodec::try_parse_response(&upstream.buffer[..header_len])?
		.ok_or_else(|| Error::Protocol("header disappeared".into()))?;
	upstream.buffer.advance(header_len);

	if has_foxy_via(&parsed.fields) {
		return Ok(RelayOutcome { close_tunnel: true });
	}

	let requested_close = is_close_requested(&parsed.fields, parsed.version);
	let close_tunnel = requested_close;

	let mode = body_mode(&parsed.fields, has_response_body_by_default(parsed.status.as_u16()))?;

	let mut hop = HeaderMap::new();
	export_connect_fields(&mut parsed.fields, &mut hop);
	if close_tunnel {
		set_connection_close(&mut parsed.fields);
	}
	if matches!(mode, BodyMode::Chunked) {
		parsed
			.fields
			.insert(http::header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
	}
	add_foxy_via(&mut parsed.fields);

	let mut out = BytesMut::new();
	HttparseCodec::write_response(parsed.status, &parsed.reason, parsed.version, &parsed.fields, &mut out);
	client.timed_write_all(&out).await?;

	copy_body(upstream, client, &mode).await?;

	// A response with no declared length, relayed over a connection that
	// isn't being held open for reuse, is itself a close signal.
	let close_tunnel = close_tunnel || matches!(mode, BodyMode::UntilClose);

	Ok(RelayOutcome { close_tunnel })
}

pub(crate) fn is_close_requested(fields: &HeaderMap, version: Version) -> bool {
	if let Some(v) = fields.get(http::header::CONNECTION) {
		if let Ok(s) = v.to_str() {
			if s.to_ascii_lowercase().split(',').any(|t| t.trim() == "close") {
				return true;
			}
			if s.to_ascii_lowercase().split(',').any(|t| t.trim() == "keep-alive") {
				return false;
			}
		}
	}
	// HTTP/1.0 defaults to close unless Connection: keep-alive was present
	// (handled above); HTTP/1.1 defaults to keep-alive.
	version == Version::HTTP_10
}

fn has_request_body_by_default(method: &Method, fields: &HeaderMap) -> bool {
	fields.contains_key(http::header::CONTENT_LENGTH) || fields.contains_key(http::header::TRANSFER_ENCODING) || method == Method::POST || method == Method::PUT
}

fn has_response_body_by_default(status: u16) -> bool {
	!matches!(status, 100..=199 | 204 | 304)
}

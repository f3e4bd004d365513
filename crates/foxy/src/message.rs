//! HTTP/1.1 header parsing and serialization.
//!
//! The wire-level parser/serializer is treated as an interface the relay
//! and tunnel engines drive, not a fixed implementation — the original
//! keeps `boost::beast`'s parser out of its own scope entirely and just
//! consumes its associate-parser contract. [`HeaderSource`] /
//! [`HeaderSink`] are that contract; [`HttparseCodec`] is the one concrete
//! implementation this crate ships, built on `httparse`, which the relay
//! engine and the test harness both use.

use bytes::{Buf, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Version};

use crate::error::Error;

/// A parsed request-line plus header fields, with `body_offset` marking
/// where the header ended within the buffer it was parsed from.
#[derive(Debug)]
pub struct ParsedRequest {
	pub method: Method,
	pub target: String,
	pub fields: HeaderMap,
	pub version: Version,
	pub header_len: usize,
}

#[derive(Debug)]
pub struct ParsedResponse {
	pub status: StatusCode,
	pub reason: String,
	pub fields: HeaderMap,
	pub version: Version,
	pub header_len: usize,
}

/// Parses headers out of a byte buffer. Implementors report `Ok(None)` when
/// the buffer doesn't yet contain a complete header, so a caller can read
/// more and retry, exactly as `httparse`'s own `Status::Partial` works.
pub trait HeaderSource {
	fn try_parse_request(buf: &[u8]) -> Result<Option<ParsedRequest>, Error>;
	fn try_parse_response(buf: &[u8]) -> Result<Option<ParsedResponse>, Error>;
}

/// Serializes a request/response head back to wire bytes.
pub trait HeaderSink {
	fn write_request(method: &Method, target: &str, version: Version, fields: &HeaderMap, out: &mut BytesMut);
	fn write_response(status: StatusCode, reason: &str, version: Version, fields: &HeaderMap, out: &mut BytesMut);
}

/// `httparse`-backed implementation of [`HeaderSource`] / [`HeaderSink`].
pub struct HttparseCodec;

const MAX_HEADERS: usize = 64;

impl HeaderSource for HttparseCodec {
	fn try_parse_request(buf: &[u8]) -> Result<Option<ParsedRequest>, Error> {
		let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
		let mut req = httparse::Request::new(&mut headers);
		match req.parse(buf) {
			Ok(httparse::Status::Complete(header_len)) => {
				let method = req
					.method
					.ok_or_else(|| Error::Protocol("missing method".into()))?;
				let method = Method::from_bytes(method.as_bytes())
					.map_err(|_| Error::Protocol(format!("invalid method: {method}")))?;
				let target = req
					.path
					.ok_or_else(|| Error::Protocol("missing request-target".into()))?
					.to_owned();
				let version = match req.version {
					Some(0) => Version::HTTP_10,
					Some(1) => Version::HTTP_11,
					other => return Err(Error::Protocol(format!("unsupported version: {other:?}"))),
				};
				let fields = to_header_map(req.headers)?;
				Ok(Some(ParsedRequest {
					method,
					target,
					fields,
					version,
					header_len,
				}))
			}
			Ok(httparse::Status::Partial) => Ok(None),
			Err(e) => Err(Error::Protocol(format!("malformed request: {e}"))),
		}
	}

	fn try_parse_response(buf: &[u8]) -> Result<Option<ParsedResponse>, Error> {
		let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
		let mut resp = httparse::Response::new(&mut headers);
		match resp.parse(buf) {
			Ok(httparse::Status::Complete(header_len)) => {
				let code = resp
					.code
					.ok_or_else(|| Error::Protocol("missing status code".into()))?;
				let status = StatusCode::from_u16(code)
					.map_err(|_| Error::Protocol(format!("invalid status code: {code}")))?;
				let reason = resp.reason.unwrap_or("").to_owned();
				let version = match resp.version {
					Some(0) => Version::HTTP_10,
					Some(1) => Version::HTTP_11,
					other => return Err(Error::Protocol(format!("unsupported version: {other:?}"))),
				};
				let fields = to_header_map(resp.headers)?;
				Ok(Some(ParsedResponse {
					status,
					reason,
					fields,
					version,
					header_len,
				}))
			}
			Ok(httparse::Status::Partial) => Ok(None),
			Err(e) => Err(Error::Protocol(format!("malformed response: {e}"))),
		}
	}
}

fn to_header_map(raw: &[httparse::Header<'_>]) -> Result<HeaderMap, Error> {
	let mut fields = HeaderMap::new();
	for h in raw {
		if h.name.is_empty() {
			continue;
		}
		let name = HeaderName::from_bytes(h.name.as_bytes())
			.map_err(|_| Error::Protocol(format!("invalid header name: {}", h.name)))?;
		let value = HeaderValue::from_bytes(h.value)
			.map_err(|_| Error::Protocol(format!("invalid header value for {}", h.name)))?;
		fields.append(name, value);
	}
	Ok(fields)
}

impl HeaderSink for HttparseCodec {
	fn write_request(method: &Method, target: &str, version: Version, fields: &HeaderMap, out: &mut BytesMut) {
		let version_str = version_str(version);
		out.extend_from_slice(method.as_str().as_bytes());
		out.extend_from_slice(b" ");
		out.extend_from_slice(target.as_bytes());
		out.extend_from_slice(b" HTTP/");
		out.extend_from_slice(version_str.as_bytes());
		out.extend_from_slice(b"\r\n");
		write_fields(fields, out);
	}

	fn write_response(status: StatusCode, reason: &str, version: Version, fields: &HeaderMap, out: &mut BytesMut) {
		let version_str = version_str(version);
		out.extend_from_slice(b"HTTP/");
		out.extend_from_slice(version_str.as_bytes());
		out.extend_from_slice(b" ");
		out.extend_from_slice(status.as_str().as_bytes());
		out.extend_from_slice(b" ");
		let reason = if reason.is_empty() {
			status.canonical_reason().unwrap_or("")
		} else {
			reason
		};
		out.extend_from_slice(reason.as_bytes());
		out.extend_from_slice(b"\r\n");
		write_fields(fields, out);
	}
}

fn version_str(version: Version) -> &'static str {
	match version {
		Version::HTTP_10 => "1.0",
		_ => "1.1",
	}
}

fn write_fields(fields: &HeaderMap, out: &mut BytesMut) {
	for (name, value) in fields.iter() {
		out.extend_from_slice(name.as_str().as_bytes());
		out.extend_from_slice(b": ");
		out.extend_from_slice(value.as_bytes());
		out.extend_from_slice(b"\r\n");
	}
	out.extend_from_slice(b"\r\n");
}

/// Build an `http::Request<()>` from a [`ParsedRequest`], for callers that
/// want the standard `http` crate types rather than the loose fields.
pub fn to_http_request(parsed: &ParsedRequest) -> Result<Request<()>, Error> {
	let mut builder = Request::builder().method(parsed.method.clone()).version(parsed.version);
	*builder.headers_mut().unwrap() = parsed.fields.clone();
	builder
		.uri(parsed.target.clone())
		.body(())
		.map_err(|e| Error::Protocol(e.to_string()))
}

/// Build an `http::Response<()>` from a [`ParsedResponse`].
pub fn to_http_response(parsed: &ParsedResponse) -> Result<Response<()>, Error> {
	let mut builder = Response::builder().status(parsed.status).version(parsed.version);
	*builder.headers_mut().unwrap() = parsed.fields.clone();
	builder.body(()).map_err(|e| Error::Protocol(e.to_string()))
}

/// Advance `buf` past a previously-parsed header.
pub fn advance_past_header(buf: &mut BytesMut, header_len: usize) {
	buf.advance(header_len);
}

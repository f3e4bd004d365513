//! URI / request-target parsing and percent-encoding.
//!
//! Grounded on the original implementation's `parse_uri.hpp`,
//! `uri_parts.hpp`, `pct_encode.hpp` and `pct_decode.hpp`. Where the
//! original drives two parallel grammars (one over `char`, one over full
//! Unicode code points), this crate drives a single grammar over `char` —
//! non-UTF-8 wire encodings are normalized to `char` first via
//! [`code_point::CodePointView`] — the two grammars describe the same ABNF,
//! so there is no need to keep them separate.

pub mod code_point;
pub mod codec;
mod grammar;

use crate::error::Error;
use code_point::{CodePointView, Encoding};

/// The parsed components of a URI or HTTP/1.1 request-target, borrowing
/// from the input that was parsed.
///
/// Every field defaults to `""` when absent, rather than `Option<&str>` —
/// matching `detail::parse_uri`'s unconditional-fields approach, since an
/// empty scheme/host/port/path/query/fragment is never itself ambiguous
/// with a present-but-empty one in this grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UriParts<'a> {
	pub scheme: &'a str,
	pub userinfo: &'a str,
	pub host: &'a str,
	pub port: &'a str,
	pub path: &'a str,
	pub query: &'a str,
	pub fragment: &'a str,
}

impl<'a> UriParts<'a> {
	/// `true` if `scheme` is exactly `http` or `https`.
	pub fn is_http(&self) -> bool {
		self.scheme == "http" || self.scheme == "https"
	}

	/// `true` if this is an absolute-form target: a scheme is present and
	/// there's no fragment (RFC 7230 §5.3.2 forbids a fragment on a request
	/// target).
	pub fn is_absolute(&self) -> bool {
		!self.scheme.is_empty() && self.fragment.is_empty()
	}

	/// `true` if this is an authority-form target: just `host[:port]`, the
	/// only form valid on a CONNECT request-line (RFC 7230 §5.3.3).
	pub fn is_authority(&self) -> bool {
		self.scheme.is_empty()
			&& self.userinfo.is_empty()
			&& !self.host.is_empty()
			&& self.path.is_empty()
			&& self.query.is_empty()
			&& self.fragment.is_empty()
	}

	/// `true` if this is an origin-form target: an absolute path, no
	/// scheme/authority (RFC 7230 §5.3.1).
	pub fn is_origin(&self) -> bool {
		self.scheme.is_empty() && self.host.is_empty() && self.path.starts_with('/')
	}

	pub fn to_owned_parts(&self) -> UriPartsOwned {
		UriPartsOwned {
			scheme: self.scheme.to_owned(),
			userinfo: self.userinfo.to_owned(),
			host: self.host.to_owned(),
			port: self.port.to_owned(),
			path: self.path.to_owned(),
			query: self.query.to_owned(),
			fragment: self.fragment.to_owned(),
		}
	}
}

/// Owned counterpart of [`UriParts`], for callers that need the parse
/// result to outlive the buffer it came from (e.g. after normalizing a
/// non-UTF-8 request-target through [`parse_uri_codepoints`]).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UriPartsOwned {
	pub scheme: String,
	pub userinfo: String,
	pub host: String,
	pub port: String,
	pub path: String,
	pub query: String,
	pub fragment: String,
}

impl UriPartsOwned {
	pub fn as_parts(&self) -> UriParts<'_> {
		UriParts {
			scheme: &self.scheme,
			userinfo: &self.userinfo,
			host: &self.host,
			port: &self.port,
			path: &self.path,
			query: &self.query,
			fragment: &self.fragment,
		}
	}
}

impl<'a> From<UriParts<'a>> for UriPartsOwned {
	fn from(parts: UriParts<'a>) -> Self {
		parts.to_owned_parts()
	}
}

/// Parse a complete URI or HTTP/1.1 request-target already available as a
/// UTF-8 `&str` (the common case: request lines arriving over the wire are
/// ASCII, a subset of UTF-8).
pub fn parse_uri(input: &str) -> Result<UriParts<'_>, Error> {
	grammar::parse_complete(input)
}

/// Parse just an authority component (`host[:port]`), for CONNECT targets
/// where that is the entire request-target.
pub fn parse_authority(input: &str) -> Result<UriParts<'_>, Error> {
	grammar::parse_authority_only(input)
}

/// Validate a path component in isolation (used by the relay engine when
/// rewriting an absolute-form request-target down to just its path).
pub fn validate_path(path: &str) -> Result<(), Error> {
	grammar::validate_path(path)
}

/// Parse a request-target carried in a non-UTF-8 wire encoding: decode it to
/// `char`s via [`CodePointView`], re-encode to UTF-8, then run the same
/// grammar used for `&str` input.
///
/// Returns an owned result because the UTF-8 buffer is built fresh from the
/// decoded code points and doesn't live anywhere else.
pub fn parse_uri_codepoints(bytes: &[u8], encoding: Encoding) -> Result<UriPartsOwned, Error> {
	let mut utf8 = Vec::with_capacity(bytes.len());
	for c in CodePointView::new(bytes, encoding) {
		codec::utf8_encode(c, &mut utf8);
	}
	let s = String::from_utf8(utf8).map_err(|_| Error::Uri("non-UTF-8 after re-encode".into()))?;
	Ok(parse_uri(&s)?.to_owned_parts())
}

//! RFC 3986 structural grammar: scheme, authority (userinfo/host/port),
//! path, query, fragment.
//!
//! Grounded on `detail/parse_uri.hpp`, which defines two parallel grammars
//! (one over `char`, one over Unicode code points) against the same ABNF.
//! Here there is only one grammar, driven by `char`; ASCII request-targets
//! are `&str` already, and anything arriving in another wire encoding is
//! normalized to `char` first by `code_point::CodePointView` before reaching
//! this module (see `uri::parse_uri_codepoints`).
//!
//! IPv4 and IPv6 literal host forms delegate to `std::net::Ipv4Addr` /
//! `Ipv6Addr`'s `FromStr`, which already implement that sub-grammar
//! correctly; hand-rolling dec-octet and the eight IPv6 elision forms would
//! just reproduce the standard library.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::Error;
use crate::uri::UriParts;

fn is_unreserved(c: char) -> bool {
	c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

fn is_sub_delim(c: char) -> bool {
	matches!(
		c,
		'!' | '$' | '&' | '\'' | '(' | ')' | '*' | '+' | ',' | ';' | '='
	)
}

fn is_pchar_start(c: char) -> bool {
	is_unreserved(c) || is_sub_delim(c) || matches!(c, ':' | '@' | '%')
}

/// Parse a complete URI or request-target into its components.
///
/// Accepts the four RFC 7230 §5.3 request-target forms plus a bare
/// `scheme://authority[/path][?query][#fragment]` absolute-URI:
///
/// * origin-form: `/path?query`
/// * absolute-form: `scheme://authority/path?query`
/// * authority-form: `host:port` (CONNECT target only)
/// * asterisk-form: `*` (OPTIONS target only, represented as an empty path)
pub fn parse_complete(input: &str) -> Result<UriParts<'_>, Error> {
	if input == "*" {
		return Ok(UriParts {
			path: "*",
			..UriParts::default()
		});
	}

	if let Some(rest) = input.strip_prefix('/') {
		let (path, query, fragment) = split_path_query_fragment(rest);
		return Ok(UriParts {
			path: &input[..1 + path.len()],
			query,
			fragment,
			..UriParts::default()
		});
	}

	// A leading `scheme:` is only the absolute-form if it's actually
	// followed by an authority (`//`). `example.com:443` also matches the
	// scheme grammar (letters, digits, '+', '-', '.') up to its colon, but
	// is an authority-form CONNECT target, not a scheme — disambiguate on
	// what follows the colon rather than on the scheme grammar alone.
	if let Some(scheme_end) = find_scheme_end(input) {
		let rest_with_slashes = &input[scheme_end + 1..];
		if let Some(rest) = rest_with_slashes.strip_prefix("//") {
			let scheme = &input[..scheme_end];
			let (authority, path_and_rest) = split_authority(rest);
			let (userinfo, host, port) = parse_authority(authority)?;
			let (path, query, fragment) = split_path_query_fragment(path_and_rest);
			return Ok(UriParts {
				scheme,
				userinfo,
				host,
				port,
				path,
				query,
				fragment,
			});
		}
	}

	// No scheme-with-authority, doesn't start with '/': only valid as an
	// authority-form CONNECT target (`host:port`), nothing else may follow.
	let (userinfo, host, port) = parse_authority(input)?;
	if userinfo.is_empty() && !host.is_empty() && !port.is_empty() {
		Ok(UriParts {
			host,
			port,
			..UriParts::default()
		})
	} else {
		Err(Error::Uri(format!("not a valid request-target: {input:?}")))
	}
}

/// Parse just an authority (userinfo/host/port), for contexts (CONNECT
/// targets) where that is the entire input.
pub fn parse_authority_only(input: &str) -> Result<UriParts<'_>, Error> {
	let (userinfo, host, port) = parse_authority(input)?;
	Ok(UriParts {
		userinfo,
		host,
		port,
		..UriParts::default()
	})
}

/// Index of the `:` terminating a `scheme`, if `input` starts with a valid
/// `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )` scheme.
fn find_scheme_end(input: &str) -> Option<usize> {
	let mut chars = input.char_indices();
	match chars.next() {
		Some((_, c)) if c.is_ascii_alphabetic() => {}
		_ => return None,
	}
	for (i, c) in chars {
		match c {
			':' => return Some(i),
			c if c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.') => continue,
			_ => return None,
		}
	}
	None
}

/// Split `rest` (after the `scheme://`) into the authority and everything
/// after it (path/query/fragment, still attached).
fn split_authority(rest: &str) -> (&str, &str) {
	let end = rest
		.find(['/', '?', '#'])
		.unwrap_or(rest.len());
	(&rest[..end], &rest[end..])
}

fn split_path_query_fragment(input: &str) -> (&str, &str, &str) {
	let (path_and_query, fragment) = match input.find('#') {
		Some(i) => (&input[..i], &input[i + 1..]),
		None => (input, ""),
	};
	let (path, query) = match path_and_query.find('?') {
		Some(i) => (&path_and_query[..i], &path_and_query[i + 1..]),
		None => (path_and_query, ""),
	};
	(path, query, fragment)
}

/// Parse `authority = [ userinfo "@" ] host [ ":" port ]`.
fn parse_authority(authority: &str) -> Result<(&str, &str, &str), Error> {
	let (userinfo, host_port) = match authority.rfind('@') {
		Some(i) => (&authority[..i], &authority[i + 1..]),
		None => ("", authority),
	};

	let (host, port) = if let Some(rest) = host_port.strip_prefix('[') {
		let close = rest
			.find(']')
			.ok_or_else(|| Error::Uri("unterminated IPv6 literal".into()))?;
		let literal = &rest[..close];
		literal
			.parse::<Ipv6Addr>()
			.map_err(|_| Error::Uri(format!("invalid IPv6 literal: {literal:?}")))?;
		let host = &host_port[..close + 2];
		let after = &rest[close + 1..];
		let port = match after.strip_prefix(':') {
			Some(p) => p,
			None if after.is_empty() => "",
			None => return Err(Error::Uri("garbage after IPv6 literal".into())),
		};
		(host, port)
	} else {
		match host_port.rfind(':') {
			Some(i) if host_port[i + 1..].bytes().all(|b| b.is_ascii_digit()) => {
				(&host_port[..i], &host_port[i + 1..])
			}
			_ => (host_port, ""),
		}
	};

	validate_host(host)?;
	if !port.is_empty() && (port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit())) {
		return Err(Error::Uri(format!("invalid port: {port:?}")));
	}

	Ok((userinfo, host, port))
}

fn validate_host(host: &str) -> Result<(), Error> {
	if host.is_empty() {
		return Ok(());
	}
	if let Some(literal) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
		return literal
			.parse::<Ipv6Addr>()
			.map(|_| ())
			.map_err(|_| Error::Uri(format!("invalid IPv6 literal: {literal:?}")));
	}
	if host.parse::<Ipv4Addr>().is_ok() {
		return Ok(());
	}
	// reg-name = *( unreserved / pct-encoded / sub-delims )
	let mut chars = host.chars();
	while let Some(c) = chars.next() {
		if is_unreserved(c) || is_sub_delim(c) {
			continue;
		}
		if c == '%' {
			let hi = chars.next();
			let lo = chars.next();
			match (hi, lo) {
				(Some(h), Some(l)) if h.is_ascii_hexdigit() && l.is_ascii_hexdigit() => continue,
				_ => return Err(Error::Uri(format!("malformed pct-encoding in host: {host:?}"))),
			}
		}
		return Err(Error::Uri(format!("invalid character in host: {host:?}")));
	}
	Ok(())
}

/// Validate that `path` conforms to `path-abempty` / `path-absolute`
/// (`*( "/" segment )`, each segment a run of pchar).
pub fn validate_path(path: &str) -> Result<(), Error> {
	if path.is_empty() || path == "*" {
		return Ok(());
	}
	let mut chars = path.chars();
	while let Some(c) = chars.next() {
		match c {
			'/' => continue,
			'%' => {
				let hi = chars.next();
				let lo = chars.next();
				match (hi, lo) {
					(Some(h), Some(l)) if h.is_ascii_hexdigit() && l.is_ascii_hexdigit() => continue,
					_ => return Err(Error::Uri(format!("malformed pct-encoding in path: {path:?}"))),
				}
			}
			c if is_pchar_start(c) => continue,
			c => return Err(Error::Uri(format!("invalid character {c:?} in path"))),
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_origin_form() {
		let u = parse_complete("/a/b?x=1#frag").unwrap();
		assert_eq!(u.path, "/a/b");
		assert_eq!(u.query, "x=1");
		assert_eq!(u.fragment, "frag");
	}

	#[test]
	fn parses_absolute_form() {
		let u = parse_complete("http://example.com:8080/a?x#y").unwrap();
		assert_eq!(u.scheme, "http");
		assert_eq!(u.host, "example.com");
		assert_eq!(u.port, "8080");
		assert_eq!(u.path, "/a");
		assert_eq!(u.query, "x");
		assert_eq!(u.fragment, "y");
	}

	#[test]
	fn parses_authority_form() {
		let u = parse_complete("example.com:443").unwrap();
		assert_eq!(u.host, "example.com");
		assert_eq!(u.port, "443");
		assert!(u.scheme.is_empty());
		assert!(u.path.is_empty());
	}

	#[test]
	fn parses_ipv6_authority() {
		let u = parse_complete("[::1]:8080").unwrap();
		assert_eq!(u.host, "[::1]");
		assert_eq!(u.port, "8080");
	}

	#[test]
	fn parses_asterisk_form() {
		let u = parse_complete("*").unwrap();
		assert_eq!(u.path, "*");
	}

	#[test]
	fn rejects_invalid_ipv6_literal() {
		assert!(parse_complete("http://[not-v6]/").is_err());
	}

	#[test]
	fn rejects_malformed_authority() {
		assert!(parse_complete("not a uri at all").is_err());
	}

	#[test]
	fn userinfo_is_parsed() {
		let u = parse_complete("http://user:pw@host/").unwrap();
		assert_eq!(u.userinfo, "user:pw");
		assert_eq!(u.host, "host");
	}
}

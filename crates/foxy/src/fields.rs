//! Hop-by-hop header handling: which fields never get forwarded, Via-based
//! loop detection, and the `Connection` token export used by the relay
//! engine before writing a header downstream.
//!
//! Grounded on `detail/export_connect_fields.hpp` and `detail/has_token.hpp`
//! in the original implementation.

use std::collections::HashSet;

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;

/// Fields that RFC 7230 §6.1 says are meaningful only between a single
/// connection's two endpoints, and must never be forwarded by an
/// intermediary verbatim.
pub const HOP_BY_HOP: [&str; 11] = [
	"connection",
	"keep-alive",
	"proxy-authenticate",
	"proxy-authorization",
	"proxy-authentication-info",
	"proxy-features",
	"proxy-instruction",
	"te",
	"trailer",
	"transfer-encoding",
	"proxy-connection",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
	HOP_BY_HOP.iter().any(|h| name.as_str().eq_ignore_ascii_case(h))
}

/// Move every hop-by-hop field from `src` to `dst`, additionally folding in
/// whatever extra field names the `src` `Connection` header nominates (RFC
/// 7230 §6.1 lets a sender name more per-connection fields there).
///
/// Grounded on `export_connect_fields.hpp`; unlike the original's
/// iterator-erase loop, which double-increments and can skip an element
/// after a removal, this collects the hop-by-hop field names up front into
/// a `HashSet` and then drains matching entries from `src` in a single
/// pass, so that bug has no Rust analogue.
pub fn export_connect_fields(src: &mut HeaderMap, dst: &mut HeaderMap) {
	let mut to_move: HashSet<String> = HOP_BY_HOP.iter().map(|s| s.to_string()).collect();

	for value in src.get_all(http::header::CONNECTION) {
		if let Ok(s) = value.to_str() {
			for token in s.split(',') {
				let token = token.trim().to_ascii_lowercase();
				if !token.is_empty() {
					to_move.insert(token);
				}
			}
		}
	}

	let names: Vec<HeaderName> = src
		.keys()
		.filter(|name| to_move.contains(name.as_str()))
		.cloned()
		.collect();

	for name in names {
		let values: Vec<HeaderValue> = src.get_all(&name).iter().cloned().collect();
		src.remove(&name);
		for value in values {
			dst.append(name.clone(), value);
		}
	}
}

/// `true` if any `Via` value already contains this proxy's loop-detection
/// token, meaning the request has already passed through us (or a proxy
/// impersonating us) once.
///
/// Grounded on `has_token.hpp`: the original does a case-insensitive
/// substring scan of the *entire* `Via` field value for the literal text
/// `"1.1 foxy"`, rather than parsing `Via`'s comma-separated list into
/// proper tokens first. Preserved here rather than "fixed", since a
/// stricter token-aware check would be a materially different (and
/// pickier) algorithm.
pub fn has_foxy_via(fields: &HeaderMap) -> bool {
	const TOKEN: &str = "1.1 foxy";
	fields
		.get_all(http::header::VIA)
		.iter()
		.filter_map(|v| v.to_str().ok())
		.any(|v| v.to_ascii_lowercase().contains(TOKEN))
}

/// Append this proxy's `Via: 1.1 foxy` entry to `fields`, preserving any
/// existing `Via` values (RFC 7230 §5.7.1 allows — and expects — multiple
/// intermediaries to each append their own entry).
pub fn add_foxy_via(fields: &mut HeaderMap) {
	fields.append(
		http::header::VIA,
		HeaderValue::from_static("1.1 foxy"),
	);
}

/// Build a fresh `Connection: close` field, replacing any existing one.
pub fn set_connection_close(fields: &mut HeaderMap) {
	fields.remove(http::header::CONNECTION);
	fields.insert(http::header::CONNECTION, HeaderValue::from_static("close"));
}

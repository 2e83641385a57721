//! Transport-facing request data and the parsers that feed the dispatcher.

use crate::multimap::MultiMap;
use std::borrow::Cow;
use std::net::SocketAddr;

/// A request as decoded by the transport layer: method and path straight
/// off the request line, header pairs in wire order, and the body bytes.
///
/// This is the dispatcher's input contract; anything that can produce one
/// (the built-in connection loop, a test, another transport) can drive
/// dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRequest {
    pub method: String,
    /// As received, possibly including a query string.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub client_addr: Option<SocketAddr>,
}

/// Parse the query string (everything after `?`) into an ordered map,
/// URL-decoding names and values. Duplicate keys survive in order.
#[must_use]
pub fn parse_query_params(path: &str) -> MultiMap {
    let mut params = MultiMap::new();
    if let Some(pos) = path.find('?') {
        for (k, v) in url::form_urlencoded::parse(path[pos + 1..].as_bytes()) {
            params.put(k.as_ref(), v.as_ref());
        }
    }
    params
}

/// Parse every `Cookie` header into an ordered name/value map. Pairs are
/// `;`-separated, names and values trimmed, the first `=` splits.
#[must_use]
pub fn parse_cookies(headers: &MultiMap) -> MultiMap {
    let mut cookies = MultiMap::new();
    for header_value in headers.get_all("cookie") {
        for pair in header_value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let Some(name) = parts.next().map(str::trim) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            let value = parts.next().unwrap_or("").trim();
            cookies.put(name, value);
        }
    }
    cookies
}

/// Parse an `application/x-www-form-urlencoded` body into an ordered map.
#[must_use]
pub fn parse_form_body(bytes: &[u8]) -> MultiMap {
    let mut fields = MultiMap::new();
    for (k, v) in url::form_urlencoded::parse(bytes) {
        fields.put(k.as_ref(), v.as_ref());
    }
    fields
}

/// Whether a `Content-Type` header names a form-encoded body, ignoring
/// parameters and case.
#[must_use]
pub fn is_form_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|mime| mime.eq_ignore_ascii_case("application/x-www-form-urlencoded"))
}

/// Normalize a request path for matching: strip the query string,
/// percent-decode each segment, and drop empty segments (doubled or
/// trailing slashes). The result always starts with `/`; the root stays
/// `/`.
///
/// Decoding per segment keeps an encoded `%2F` from splitting a segment
/// in two.
#[must_use]
pub fn normalize_path(raw: &str) -> String {
    let without_query = raw.split('?').next().unwrap_or("/");
    let mut path = String::new();
    for segment in without_query.split('/').filter(|s| !s.is_empty()) {
        let decoded: Cow<'_, str> = match urlencoding::decode(segment) {
            Ok(d) => d,
            Err(_) => Cow::Borrowed(segment),
        };
        path.push('/');
        path.push_str(&decoded);
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

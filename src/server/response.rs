//! Transport-facing response data and wire encoding.

use crate::codec::BodyCodec;
use crate::dispatcher::{Body, Response};
use crate::multimap::MultiMap;

/// A response ready for the transport layer: status, header pairs in
/// emission order (`Set-Cookie` entries included), and body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

pub(crate) fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        411 => "Length Required",
        413 => "Payload Too Large",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "OK",
    }
}

/// Assemble the wire response from the handler's response model.
///
/// Instance default headers are overlaid first, explicit response headers
/// winning on key collision. A `Content-Type` is defaulted from the body
/// shape when the handler set none: `text/plain` for raw bytes, the
/// codec's media type for structured payloads. Cookies become one
/// `Set-Cookie` header each, after the regular headers.
#[must_use]
pub fn encode_response(
    response: Response,
    default_headers: &MultiMap,
    codec: &dyn BodyCodec,
) -> RawResponse {
    let mut merged = response.headers.merge_over(default_headers);
    let body = match response.body {
        Body::Empty => Vec::new(),
        Body::Bytes(bytes) => {
            if !bytes.is_empty() && !merged.contains_key("content-type") {
                merged.put("Content-Type", "text/plain");
            }
            bytes
        }
        Body::Json(value) => {
            if !merged.contains_key("content-type") {
                merged.put("Content-Type", codec.content_type());
            }
            codec.encode(&value)
        }
    };

    let mut headers: Vec<(String, String)> = merged
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    for cookie in &response.cookies {
        headers.push(("Set-Cookie".to_string(), cookie.header_value()));
    }

    RawResponse {
        status: response.status,
        headers,
        body,
    }
}

/// Serialize a [`RawResponse`] into HTTP/1.1 bytes, adding
/// `Content-Length` and the `Connection` header. One buffer, one write:
/// the client never observes a partially-written response.
#[must_use]
pub fn to_wire_bytes(response: &RawResponse, keep_alive: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(128 + response.body.len());
    out.extend_from_slice(
        format!(
            "HTTP/1.1 {} {}\r\n",
            response.status,
            status_reason(response.status)
        )
        .as_bytes(),
    );
    for (name, value) in &response.headers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n", response.body.len()).as_bytes());
    out.extend_from_slice(if keep_alive {
        b"Connection: keep-alive\r\n" as &[u8]
    } else {
        b"Connection: close\r\n" as &[u8]
    });
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&response.body);
    out
}

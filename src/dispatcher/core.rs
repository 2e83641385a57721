//! Dispatcher core - hot path for request dispatch.
//!
//! Turns one transport-level [`RawRequest`] into one [`RawResponse`]:
//! size gate, parsing into the request model, route resolution, handler
//! invocation with panic isolation, bounded fall-through, and response
//! assembly. No instance-wide lock is held while a handler runs; every
//! request owns its model values exclusively.

use crate::codec::BodyCodec;
use crate::multimap::MultiMap;
use crate::router::Router;
use crate::server::request::{
    is_form_content_type, normalize_path, parse_cookies, parse_form_body, parse_query_params,
    RawRequest,
};
use crate::server::response::{encode_response, RawResponse};
use http::Method;
use serde::Serialize;
use serde_json::{json, Value};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Upper bound on fall-through retries within one dispatch, so a handler
/// that always yields cannot loop forever.
pub const MAX_FALLTHROUGH: usize = 8;

/// What a handler tells the dispatcher to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    /// Serialize the response as-is.
    Continue,
    /// Serialize the response as-is, but log the failure.
    Error,
    /// Discard this attempt and try the next-best matching route.
    Fallthrough,
}

/// The handler callback: reads the request, mutates the fresh response,
/// and may downcast its registration-time context value.
pub type HandlerFn =
    Arc<dyn Fn(&Request, &mut Response, Option<&dyn Any>) -> HandlerResult + Send + Sync>;

/// Structured inbound request handed to handlers. Built fresh per dispatch
/// and owned exclusively by the coroutine handling the request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Normalized path: query stripped, percent-decoded, no trailing slash.
    pub path: String,
    /// Path exactly as received, including any query string.
    pub raw_path: String,
    pub client_addr: Option<SocketAddr>,
    /// Query-string pairs plus matched wildcard bindings, merged. Query
    /// pairs are inserted first, so `get` prefers them on a name collision;
    /// `get_all` exposes both.
    pub url_params: MultiMap,
    /// Case-insensitive lookup, original case preserved.
    pub headers: MultiMap,
    pub cookies: MultiMap,
    /// Populated only for `application/x-www-form-urlencoded` bodies.
    pub post_fields: MultiMap,
    /// Structured body decoded by the instance codec, when the content
    /// type selected it and decoding succeeded.
    pub json_body: Option<Value>,
    /// Decode failure detail; the handler decides what to answer.
    pub body_error: Option<String>,
    /// Raw body bytes, always available.
    pub body: Vec<u8>,
}

impl Request {
    #[inline]
    #[must_use]
    pub fn get_url_param(&self, name: &str) -> Option<&str> {
        self.url_params.get(name)
    }

    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    #[inline]
    #[must_use]
    pub fn get_cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name)
    }

    #[inline]
    #[must_use]
    pub fn get_post_field(&self, name: &str) -> Option<&str> {
        self.post_fields.get(name)
    }
}

/// Response body. The enum makes raw bytes and structured payloads
/// mutually exclusive by construction; whichever setter ran last wins.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    Json(Value),
}

/// One `Set-Cookie` entry on the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub expires: Option<String>,
    pub max_age: Option<i64>,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
}

impl SetCookie {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        SetCookie {
            name: name.into(),
            value: value.into(),
            expires: None,
            max_age: None,
            domain: None,
            path: None,
            secure: false,
            http_only: false,
        }
    }

    /// Wire form of the cookie, attributes in `Expires`, `Max-Age`,
    /// `Domain`, `Path`, `Secure`, `HttpOnly` order.
    #[must_use]
    pub fn header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(expires) = &self.expires {
            out.push_str("; Expires=");
            out.push_str(expires);
        }
        if let Some(max_age) = self.max_age {
            out.push_str("; Max-Age=");
            out.push_str(&max_age.to_string());
        }
        if let Some(domain) = &self.domain {
            out.push_str("; Domain=");
            out.push_str(domain);
        }
        if let Some(path) = &self.path {
            out.push_str("; Path=");
            out.push_str(path);
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        out
    }
}

/// Structured outbound response. Seeded with status 200 and no body before
/// the handler runs; instance default headers are overlaid at
/// serialization time, with explicit response headers winning.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Body,
    /// Case-insensitive lookup; `set_header` appends, never overwrites.
    pub headers: MultiMap,
    pub cookies: Vec<SetCookie>,
}

impl Response {
    #[must_use]
    pub fn new() -> Self {
        Response {
            status: 200,
            body: Body::Empty,
            headers: MultiMap::for_headers(),
            cookies: Vec::new(),
        }
    }

    /// JSON error payload, the shape every dispatcher-generated failure
    /// response uses.
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        let mut resp = Response::new();
        resp.status = status;
        resp.body = Body::Json(json!({ "error": message }));
        resp
    }

    /// Replace the body with raw bytes (or a string).
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = Body::Bytes(body.into());
    }

    /// Replace the body with a structured payload, encoded by the instance
    /// codec at serialization time.
    pub fn set_json(&mut self, value: Value) {
        self.body = Body::Json(value);
    }

    /// Append a response header.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.put(name, value);
    }

    pub fn add_cookie(&mut self, cookie: SetCookie) {
        self.cookies.push(cookie);
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-instance dispatch engine. Holds the frozen routing table, the
/// default header overlay, the body size limit, and the body codec; shared
/// read-only across connection coroutines.
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<Router>,
    default_headers: MultiMap,
    max_body_size: usize,
    codec: Arc<dyn BodyCodec>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        router: Arc<Router>,
        default_headers: MultiMap,
        max_body_size: usize,
        codec: Arc<dyn BodyCodec>,
    ) -> Self {
        Dispatcher {
            router,
            default_headers,
            max_body_size,
            codec,
        }
    }

    /// Body size limit the transport should enforce while reading.
    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    fn encode(&self, response: Response) -> RawResponse {
        encode_response(response, &self.default_headers, self.codec.as_ref())
    }

    fn not_found(&self, method: &Method, path: &str) -> RawResponse {
        let mut resp = Response::new();
        resp.status = 404;
        resp.body = Body::Json(json!({
            "error": "Not Found",
            "method": method.as_str(),
            "path": path,
        }));
        self.encode(resp)
    }

    /// Dispatch one decoded request and produce the response to serialize.
    ///
    /// Never fails toward the host: every outcome, including oversized
    /// bodies, unroutable paths, decode failures, and handler panics, is
    /// resolved into a client-facing response.
    #[must_use]
    pub fn dispatch(&self, raw: RawRequest) -> RawResponse {
        // Size gate comes first: over the limit means no decode step and
        // no handler invocation at all.
        if raw.body.len() > self.max_body_size {
            warn!(
                body_bytes = raw.body.len(),
                max_body_size = self.max_body_size,
                path = %raw.path,
                "Request body over limit"
            );
            return self.encode(Response::error(413, "request body too large"));
        }

        let method = match Method::from_bytes(raw.method.as_bytes()) {
            Ok(m) => m,
            Err(_) => {
                warn!(method = %raw.method, "Unparseable request method");
                return self.encode(Response::error(400, "invalid method"));
            }
        };
        let path = normalize_path(&raw.path);

        let mut headers = MultiMap::for_headers();
        for (name, value) in &raw.headers {
            headers.put(name.as_str(), value.as_str());
        }
        let cookies = parse_cookies(&headers);
        let base_params = parse_query_params(&raw.path);

        let content_type = headers.get("content-type").unwrap_or("");
        let mut post_fields = MultiMap::new();
        let mut json_body = None;
        let mut body_error = None;
        if !raw.body.is_empty() {
            if is_form_content_type(content_type) {
                post_fields = parse_form_body(&raw.body);
            } else if self.codec.matches(content_type) {
                match self.codec.decode(&raw.body) {
                    Ok(value) => json_body = Some(value),
                    Err(e) => {
                        debug!(error = %e, path = %path, "Structured body decode failed");
                        body_error = Some(e);
                    }
                }
            }
        }

        let mut tried: Vec<usize> = Vec::new();
        let mut default_tried = false;
        loop {
            let resolved = if tried.len() < MAX_FALLTHROUGH {
                self.router.resolve(&method, &path, &tried)
            } else {
                warn!(path = %path, attempts = tried.len(), "Fall-through budget exhausted");
                None
            };
            let route_match = match resolved {
                Some(m) => m,
                None if !default_tried => match self.router.default_route() {
                    Some(d) => {
                        default_tried = true;
                        d
                    }
                    None => return self.not_found(&method, &path),
                },
                None => return self.not_found(&method, &path),
            };
            let route = Arc::clone(&route_match.route);

            let mut url_params = base_params.clone();
            for (name, value) in &route_match.bindings {
                url_params.put(name.as_str(), value.as_str());
            }
            let request = Request {
                method: method.clone(),
                path: path.clone(),
                raw_path: raw.path.clone(),
                client_addr: raw.client_addr,
                url_params,
                headers: headers.clone(),
                cookies: cookies.clone(),
                post_fields: post_fields.clone(),
                json_body: json_body.clone(),
                body_error: body_error.clone(),
                body: raw.body.clone(),
            };
            let mut response = Response::new();
            let context: Option<&dyn Any> = route.context.as_deref().map(|c| c as &dyn Any);

            info!(
                method = %method,
                path = %path,
                route_pattern = %route.pattern.raw(),
                "Request dispatched to handler"
            );
            let execution_start = Instant::now();
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                (route.handler)(&request, &mut response, context)
            }));
            let execution_time_ms = execution_start.elapsed().as_millis() as u64;

            match outcome {
                Err(panic) => {
                    let panic_message = format!("{panic:?}");
                    error!(
                        method = %method,
                        path = %path,
                        route_pattern = %route.pattern.raw(),
                        panic_message = %panic_message,
                        execution_time_ms,
                        "Handler panicked - CRITICAL"
                    );
                    return self.encode(Response::error(500, "handler panicked"));
                }
                Ok(HandlerResult::Continue) => {
                    info!(
                        status = response.status,
                        execution_time_ms,
                        "Handler execution complete"
                    );
                    return self.encode(response);
                }
                Ok(HandlerResult::Error) => {
                    error!(
                        method = %method,
                        path = %path,
                        route_pattern = %route.pattern.raw(),
                        status = response.status,
                        execution_time_ms,
                        "Handler reported an error"
                    );
                    return self.encode(response);
                }
                Ok(HandlerResult::Fallthrough) => {
                    debug!(
                        route_pattern = %route.pattern.raw(),
                        "Handler requested fall-through"
                    );
                    if default_tried {
                        // the default route was the last resort
                        return self.not_found(&method, &path);
                    }
                    tried.push(route.index);
                }
            }
        }
    }
}

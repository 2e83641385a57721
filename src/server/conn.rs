//! Per-connection serving loop.
//!
//! Each accepted connection runs this loop in its own coroutine:
//! read one request (head via `httparse`, body by `Content-Length`),
//! dispatch, write the serialized response in a single buffer, repeat
//! while keep-alive holds. Requests on one connection are therefore
//! handled strictly in order; concurrency comes from running many
//! connection coroutines at once.

use crate::dispatcher::Dispatcher;
use crate::server::request::RawRequest;
use crate::server::response::{to_wire_bytes, RawResponse};
use may::net::TcpStream;
use rustls::{ServerConnection, StreamOwned};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Request heads larger than this are answered with 431 and the
/// connection is closed.
const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Header slots for `httparse`; sized for API gateway/proxy traffic.
const MAX_HEADERS: usize = 32;

/// A plain or TLS-terminated byte stream, one per connection.
pub(crate) enum Stream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ServerConnection, TcpStream>>),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.read(buf),
            Stream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.write(buf),
            Stream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(s) => s.flush(),
            Stream::Tls(s) => s.flush(),
        }
    }
}

/// State shared between the accept loop, connection coroutines, and the
/// stop path: the shutdown flag, the post-drain discard flag, and the
/// in-flight request counter the drain waits on.
pub(crate) struct ServerShared {
    shutdown: AtomicBool,
    discard: AtomicBool,
    inflight: AtomicUsize,
}

impl ServerShared {
    pub(crate) fn new() -> Self {
        ServerShared {
            shutdown: AtomicBool::new(false),
            discard: AtomicBool::new(false),
            inflight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn begin_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub(crate) fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// After the drain deadline: in-flight responses must be discarded
    /// rather than written, so no late or partial response reaches a
    /// client.
    pub(crate) fn force_discard(&self) {
        self.discard.store(true, Ordering::Release);
    }

    pub(crate) fn discard_responses(&self) -> bool {
        self.discard.load(Ordering::Acquire)
    }

    pub(crate) fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    fn begin_request(self: &Arc<Self>) -> InflightGuard {
        self.inflight.fetch_add(1, Ordering::SeqCst);
        InflightGuard(Arc::clone(self))
    }
}

struct InflightGuard(Arc<ServerShared>);

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.inflight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serve one connection until close, keep-alive exhaustion, or shutdown.
pub(crate) fn handle_connection(
    mut stream: Stream,
    peer: Option<SocketAddr>,
    dispatcher: Arc<Dispatcher>,
    shared: Arc<ServerShared>,
    keepalive_max: usize,
) {
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut served = 0usize;

    loop {
        if shared.shutting_down() {
            return;
        }

        // Read until the head terminator is buffered; leftover bytes from
        // the previous request may already contain it.
        while !contains_head_end(&buf) {
            if buf.len() > MAX_HEAD_BYTES {
                let _ = write_simple(&mut stream, 431);
                return;
            }
            let mut chunk = [0u8; 4096];
            match stream.read(&mut chunk) {
                Ok(0) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    debug!(peer = ?peer, error = %e, "Connection read failed");
                    return;
                }
            }
        }

        let (method, path, version, headers, head_len) = {
            let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut parsed = httparse::Request::new(&mut header_storage);
            match parsed.parse(&buf) {
                Ok(httparse::Status::Complete(head_len)) => {
                    let headers: Vec<(String, String)> = parsed
                        .headers
                        .iter()
                        .map(|h| {
                            (
                                h.name.to_string(),
                                String::from_utf8_lossy(h.value).to_string(),
                            )
                        })
                        .collect();
                    (
                        parsed.method.unwrap_or("").to_string(),
                        parsed.path.unwrap_or("/").to_string(),
                        parsed.version.unwrap_or(1),
                        headers,
                        head_len,
                    )
                }
                Ok(httparse::Status::Partial) | Err(_) => {
                    warn!(peer = ?peer, "Unparseable request head");
                    let _ = write_simple(&mut stream, 400);
                    return;
                }
            }
        };

        // Bodies are read by Content-Length only; chunked uploads are
        // answered with 411.
        if header_value(&headers, "transfer-encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
        {
            let _ = write_simple(&mut stream, 411);
            return;
        }
        let content_length = match header_value(&headers, "content-length") {
            Some(v) => match v.trim().parse::<usize>() {
                Ok(n) => n,
                Err(_) => {
                    let _ = write_simple(&mut stream, 400);
                    return;
                }
            },
            None => 0,
        };
        // Over-limit bodies are refused before reading them in.
        if content_length > dispatcher.max_body_size() {
            warn!(
                peer = ?peer,
                content_length,
                max_body_size = dispatcher.max_body_size(),
                "Declared body over limit"
            );
            let _ = write_simple(&mut stream, 413);
            return;
        }

        // drop the consumed head, keep any bytes already read past it
        let mut body = buf.split_off(head_len);
        buf.clear();
        while body.len() < content_length {
            let mut chunk = [0u8; 4096];
            match stream.read(&mut chunk) {
                Ok(0) => return,
                Ok(n) => body.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    debug!(peer = ?peer, error = %e, "Body read failed");
                    return;
                }
            }
        }
        // bytes past Content-Length belong to the next pipelined request
        buf = body.split_off(content_length);

        served += 1;
        let client_close = header_value(&headers, "connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("close"));
        let keep_alive =
            version == 1 && !client_close && served < keepalive_max && !shared.shutting_down();

        let raw = RawRequest {
            method,
            path,
            headers,
            body,
            client_addr: peer,
        };
        let response = {
            let _guard = shared.begin_request();
            dispatcher.dispatch(raw)
        };

        if shared.discard_responses() {
            debug!(peer = ?peer, "Response discarded during forced shutdown");
            return;
        }
        let bytes = to_wire_bytes(&response, keep_alive);
        if let Err(e) = stream.write_all(&bytes).and_then(|()| stream.flush()) {
            debug!(peer = ?peer, error = %e, "Connection write failed");
            return;
        }
        if !keep_alive {
            return;
        }
    }
}

fn contains_head_end(buf: &[u8]) -> bool {
    buf.windows(4).any(|w| w == b"\r\n\r\n")
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn write_simple(stream: &mut Stream, status: u16) -> io::Result<()> {
    let response = RawResponse {
        status,
        headers: Vec::new(),
        body: Vec::new(),
    };
    stream.write_all(&to_wire_bytes(&response, false))?;
    stream.flush()
}

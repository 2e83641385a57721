//! Listener binding, the accept loop, and the running-server handle.

use super::conn::{handle_connection, ServerShared, Stream};
use super::tls::TlsAcceptor;
use crate::dispatcher::Dispatcher;
use crate::error::ServerError;
use crate::runtime_config::RuntimeConfig;
use may::coroutine::{self, JoinHandle};
use may::net::TcpListener;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// How the listener terminates connections.
pub enum BindMode {
    Plain,
    Tls(TlsAcceptor),
}

/// Binds a dispatcher to a socket and spawns the serving coroutines.
pub struct HttpServer {
    dispatcher: Arc<Dispatcher>,
    config: RuntimeConfig,
}

impl HttpServer {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, config: RuntimeConfig) -> Self {
        HttpServer { dispatcher, config }
    }

    /// Bind the listener and start accepting.
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] when the address is unavailable,
    /// [`ServerError::Spawn`] when the accept coroutine cannot start.
    pub fn start(self, addr: SocketAddr, mode: BindMode) -> Result<ServerHandle, ServerError> {
        let listener = TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;
        let tls = matches!(mode, BindMode::Tls(_));

        let shared = Arc::new(ServerShared::new());
        let accept_shared = Arc::clone(&shared);
        let dispatcher = self.dispatcher;
        let config = self.config;

        // SAFETY: coroutine::Builder::spawn is marked unsafe by the may
        // runtime. The closure is Send + 'static and owns everything it
        // touches; shutdown cancels this coroutine at a blocking point.
        let handle = unsafe {
            coroutine::Builder::new()
                .stack_size(config.stack_size)
                .spawn(move || accept_loop(listener, mode, dispatcher, accept_shared, config))
        }
        .map_err(ServerError::Spawn)?;

        info!(addr = %local_addr, tls, "Server started");
        Ok(ServerHandle {
            addr: local_addr,
            handle,
            shared,
            drain_timeout: config.drain_timeout,
        })
    }
}

fn accept_loop(
    listener: TcpListener,
    mode: BindMode,
    dispatcher: Arc<Dispatcher>,
    shared: Arc<ServerShared>,
    config: RuntimeConfig,
) {
    for incoming in listener.incoming() {
        if shared.shutting_down() {
            break;
        }
        let sock = match incoming {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Accept failed");
                continue;
            }
        };
        let peer = sock.peer_addr().ok();
        let stream = match &mode {
            BindMode::Plain => Stream::Plain(sock),
            BindMode::Tls(acceptor) => match acceptor.accept(sock) {
                Ok(tls_stream) => Stream::Tls(Box::new(tls_stream)),
                Err(e) => {
                    warn!(peer = ?peer, error = %e, "TLS session setup failed");
                    continue;
                }
            },
        };
        let conn_dispatcher = Arc::clone(&dispatcher);
        let conn_shared = Arc::clone(&shared);
        // SAFETY: as above; each connection coroutine owns its stream and
        // exits when the connection closes or shutdown is flagged.
        let spawn_result = unsafe {
            coroutine::Builder::new()
                .stack_size(config.stack_size)
                .spawn(move || {
                    handle_connection(
                        stream,
                        peer,
                        conn_dispatcher,
                        conn_shared,
                        config.keepalive_max,
                    )
                })
        };
        if let Err(e) = spawn_result {
            error!(peer = ?peer, error = %e, "Failed to spawn connection coroutine");
        }
    }
}

/// Handle to a running server.
///
/// Stopping is graceful: accepting ends immediately, in-flight requests
/// get a bounded drain window, and anything still running after the
/// deadline has its response discarded instead of partially written.
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
    shared: Arc<ServerShared>,
    drain_timeout: Duration,
}

impl ServerHandle {
    /// The bound address; useful when binding port 0.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Poll the bound address until it accepts connections.
    ///
    /// # Errors
    ///
    /// `TimedOut` if the server is not ready within ~250ms.
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Stop gracefully: stop accepting, drain in-flight requests for the
    /// configured timeout, then force-close. Consumes the handle.
    pub fn stop(self) {
        self.shared.begin_shutdown();
        // SAFETY: cancel is marked unsafe by the may runtime. The handle
        // is valid, the coroutine blocks in accept, and cancellation is
        // the intended shutdown path.
        unsafe {
            self.handle.coroutine().cancel();
        }
        let _ = self.handle.join();

        let drain_start = Instant::now();
        while self.shared.inflight() > 0 {
            if drain_start.elapsed() >= self.drain_timeout {
                warn!(
                    inflight = self.shared.inflight(),
                    "Drain timeout reached, discarding remaining responses"
                );
                self.shared.force_discard();
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        info!(addr = %self.addr, "Server stopped");
    }

    /// Block until the accept coroutine finishes.
    ///
    /// # Errors
    ///
    /// Returns an error if the server coroutine panicked.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

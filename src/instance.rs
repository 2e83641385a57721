//! The server instance: registration surface and lifecycle manager.

use crate::codec::{BodyCodec, JsonCodec};
use crate::dispatcher::{Dispatcher, HandlerResult, Request, Response};
use crate::error::ServerError;
use crate::multimap::MultiMap;
use crate::router::{PathPattern, Route, Router};
use crate::runtime_config::RuntimeConfig;
use crate::server::{BindMode, HttpServer, ServerHandle, TlsAcceptor};
use http::Method;
use std::any::Any;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Default request body limit: 1 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// One configured, independently startable server bound to one port.
///
/// Lifecycle: construct, register routes and options, `start` (or
/// `start_secure`), serve until `stop`, drop. Registration is rejected
/// while the instance is running - the routing table is frozen into the
/// serving coroutines at `start`. Multiple instances may coexist on
/// different ports within one process.
///
/// ```no_run
/// use gantry::{HandlerResult, Instance};
///
/// # fn main() -> Result<(), gantry::ServerError> {
/// let mut instance = Instance::new(8537);
/// instance.set_default_header("Access-Control-Allow-Origin", "*");
/// instance.add_endpoint(
///     "GET",
///     "/test",
///     "",
///     |_req, resp, _ctx| {
///         resp.set_body("Hello World!");
///         HandlerResult::Continue
///     },
///     None,
/// )?;
/// instance.start()?;
/// // ... serve ...
/// instance.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct Instance {
    port: u16,
    default_headers: MultiMap,
    max_body_size: usize,
    routes: Vec<Route>,
    default_route: Option<Route>,
    codec: Arc<dyn BodyCodec>,
    config: RuntimeConfig,
    handle: Option<ServerHandle>,
}

impl Instance {
    /// A fresh instance for `port` with no routes, no default headers, the
    /// JSON codec, and a 1 MiB body limit. Bind `port` 0 to let the OS
    /// pick; read the result from [`Instance::addr`] after `start`.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Instance {
            port,
            default_headers: MultiMap::for_headers(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            routes: Vec::new(),
            default_route: None,
            codec: Arc::new(JsonCodec),
            config: RuntimeConfig::from_env(),
            handle: None,
        }
    }

    /// Register an endpoint. `verb` is an HTTP method name or `"*"` for
    /// any verb; `prefix` and `suffix` are joined into one pattern, each
    /// segment a literal or a `:name` wildcard. The `context` value is
    /// stored verbatim and handed back to the handler on every dispatch.
    ///
    /// # Errors
    ///
    /// [`ServerError::AlreadyRunning`] while serving,
    /// [`ServerError::InvalidVerb`] / [`ServerError::InvalidPattern`] for
    /// unparseable registrations.
    pub fn add_endpoint<H>(
        &mut self,
        verb: &str,
        prefix: &str,
        suffix: &str,
        handler: H,
        context: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Result<(), ServerError>
    where
        H: Fn(&Request, &mut Response, Option<&dyn Any>) -> HandlerResult + Send + Sync + 'static,
    {
        if self.handle.is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        let verb = parse_verb(verb)?;
        let pattern = PathPattern::parse(prefix, suffix)?;
        self.routes.push(Route {
            verb,
            pattern,
            handler: Arc::new(handler),
            context,
            index: self.routes.len(),
            is_default: false,
        });
        Ok(())
    }

    /// Register the fallback handler invoked when nothing matches. Without
    /// one, unmatched requests get a plain 404 response.
    ///
    /// # Errors
    ///
    /// [`ServerError::AlreadyRunning`] while serving.
    pub fn set_default_endpoint<H>(
        &mut self,
        handler: H,
        context: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Result<(), ServerError>
    where
        H: Fn(&Request, &mut Response, Option<&dyn Any>) -> HandlerResult + Send + Sync + 'static,
    {
        if self.handle.is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        self.default_route = Some(Route {
            verb: None,
            pattern: PathPattern::parse("", "")?,
            handler: Arc::new(handler),
            context,
            index: usize::MAX,
            is_default: true,
        });
        Ok(())
    }

    /// Add a header sent on every response unless the handler sets the
    /// same key itself.
    pub fn set_default_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.default_headers.put(key, value);
    }

    /// Request bodies over `n` bytes are answered with 413; the handler is
    /// never invoked for them. A body of exactly `n` bytes is accepted.
    pub fn set_max_body_size(&mut self, n: usize) {
        self.max_body_size = n;
    }

    /// Replace the structured-body codec (default: JSON).
    pub fn set_body_codec(&mut self, codec: Arc<dyn BodyCodec>) {
        self.codec = codec;
    }

    /// Override the environment-derived runtime configuration.
    pub fn set_runtime_config(&mut self, config: RuntimeConfig) {
        self.config = config;
    }

    /// Bind a plain TCP listener and start serving.
    ///
    /// # Errors
    ///
    /// [`ServerError::AlreadyRunning`] on double start,
    /// [`ServerError::Bind`] when the port is unavailable.
    pub fn start(&mut self) -> Result<(), ServerError> {
        self.start_with(BindMode::Plain)
    }

    /// Bind a TLS listener using PEM-encoded key and certificate bytes.
    /// Reading the files is the host's job.
    ///
    /// # Errors
    ///
    /// [`ServerError::Tls`] for rejected credential material, otherwise as
    /// [`Instance::start`]. The instance stays configured and startable
    /// after a failure.
    pub fn start_secure(&mut self, key_pem: &[u8], cert_pem: &[u8]) -> Result<(), ServerError> {
        let acceptor = TlsAcceptor::from_pem_bytes(key_pem, cert_pem)?;
        self.start_with(BindMode::Tls(acceptor))
    }

    fn start_with(&mut self, mode: BindMode) -> Result<(), ServerError> {
        if self.handle.is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        let router = Router::new(self.routes.clone(), self.default_route.clone());
        let dispatcher = Dispatcher::new(
            Arc::new(router),
            self.default_headers.clone(),
            self.max_body_size,
            Arc::clone(&self.codec),
        );
        let server = HttpServer::new(Arc::new(dispatcher), self.config);
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let handle = server.start(addr, mode)?;
        info!(addr = %handle.addr(), routes = self.routes.len(), "Instance running");
        self.handle = Some(handle);
        Ok(())
    }

    /// Stop serving: accepting ends immediately, in-flight requests drain
    /// within the configured timeout, stragglers are force-closed with
    /// their responses discarded. The instance may be started again.
    ///
    /// # Errors
    ///
    /// [`ServerError::NotRunning`] if the instance is not serving.
    pub fn stop(&mut self) -> Result<(), ServerError> {
        match self.handle.take() {
            Some(handle) => {
                handle.stop();
                Ok(())
            }
            None => Err(ServerError::NotRunning),
        }
    }

    /// The bound address while running.
    #[must_use]
    pub fn addr(&self) -> Option<SocketAddr> {
        self.handle.as_ref().map(ServerHandle::addr)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Poll until the listener accepts connections; useful right after
    /// `start` in tests.
    ///
    /// # Errors
    ///
    /// `TimedOut` when not ready in time, `NotConnected` when not running.
    pub fn wait_ready(&self) -> io::Result<()> {
        match &self.handle {
            Some(handle) => handle.wait_ready(),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "instance is not running",
            )),
        }
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            info!("Stopping running instance on drop");
            handle.stop();
        }
    }
}

fn parse_verb(verb: &str) -> Result<Option<Method>, ServerError> {
    if verb == "*" {
        return Ok(None);
    }
    Method::from_bytes(verb.to_ascii_uppercase().as_bytes())
        .map(Some)
        .map_err(|_| ServerError::InvalidVerb(verb.to_string()))
}

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors returned synchronously from instance lifecycle and registration
/// calls.
///
/// Request-path failures (no matching route, oversized bodies, handler
/// panics, malformed payloads) never surface here; they are resolved into
/// client-facing responses by the dispatcher.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound to the requested address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The supplied TLS credential material was rejected.
    #[error("invalid TLS credential material: {0}")]
    Tls(String),

    /// The server coroutine could not be spawned.
    #[error("failed to spawn server coroutine: {0}")]
    Spawn(#[source] io::Error),

    /// `start` was called while the instance was already serving.
    #[error("instance is already running")]
    AlreadyRunning,

    /// `stop` was called on an instance that is not serving.
    #[error("instance is not running")]
    NotRunning,

    /// A route pattern could not be parsed at registration time.
    #[error("invalid route pattern `{0}`")]
    InvalidPattern(String),

    /// A verb string could not be parsed at registration time.
    #[error("invalid verb `{0}`")]
    InvalidVerb(String),
}

//! # Server Module
//!
//! The transport layer behind the dispatch engine: request/response wire
//! structs and parsers, the per-connection serving loop, plain and TLS
//! listener binding, and the running-server handle.
//!
//! The routing core only ever sees [`request::RawRequest`] and
//! [`response::RawResponse`]; everything else in this module is the
//! built-in transport that produces and consumes them.

pub(crate) mod conn;
pub mod http_server;
pub mod request;
pub mod response;
pub mod tls;

pub use http_server::{BindMode, HttpServer, ServerHandle};
pub use request::RawRequest;
pub use response::RawResponse;
pub use tls::TlsAcceptor;

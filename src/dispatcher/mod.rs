//! # Dispatcher Module
//!
//! The per-request pipeline between the transport and the host's handlers.
//! For every decoded request the dispatcher:
//!
//! 1. rejects bodies over the instance limit (413, handler never runs);
//! 2. parses the query string, `Cookie` header, form fields, and - when
//!    the content type selects the instance codec - the structured body,
//!    turning decode failures into a `body_error` flag instead of a
//!    failure;
//! 3. resolves the most specific route and builds the [`Request`] model
//!    with wildcard bindings merged into `url_params`;
//! 4. seeds a [`Response`] at status 200 and invokes the handler under
//!    `catch_unwind` - a panic becomes a 500 without touching the serving
//!    loop or other in-flight requests;
//! 5. honors the returned [`HandlerResult`]: serialize, serialize-and-log,
//!    or retry on the next-best route (bounded by [`MAX_FALLTHROUGH`]);
//! 6. assembles the wire response, overlaying instance default headers and
//!    emitting cookies as `Set-Cookie` entries.
//!
//! No side effects persist past the request/response pair; handlers that
//! share state do so through their own context values.

mod core;

pub use core::{
    Body, Dispatcher, HandlerFn, HandlerResult, Request, Response, SetCookie, MAX_FALLTHROUGH,
};

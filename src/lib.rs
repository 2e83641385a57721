//! # gantry
//!
//! **gantry** is an embeddable, coroutine-powered HTTP(S) server library:
//! the host program registers callback handlers against URL patterns and
//! method verbs, and gantry dispatches every incoming request to the best
//! matching handler.
//!
//! ## Overview
//!
//! There is no spec file, no code generation, and no framework
//! inversion-of-control: a host builds an [`Instance`], registers
//! endpoints as plain functions or closures, starts it, and stops it when
//! done. Patterns mix literal segments with named wildcards
//! (`/pets/:id`); overlapping registrations resolve deterministically by
//! specificity.
//!
//! ## Architecture
//!
//! - **[`multimap`]** - insertion-ordered multi-map backing URL
//!   parameters, headers, cookies, and form fields
//! - **[`router`]** - pattern parsing, matching, and specificity-ranked
//!   route resolution over an immutable table
//! - **[`dispatcher`]** - the per-request pipeline: size limits, parsing,
//!   handler invocation with panic isolation, bounded fall-through
//! - **[`server`]** - the built-in transport: `httparse`-based HTTP/1.x
//!   head parsing, keep-alive connection coroutines, plain TCP and rustls
//!   TLS binds
//! - **[`instance`]** - the lifecycle manager and registration surface
//! - **[`codec`]** - pluggable structured-body decode/encode (JSON by
//!   default)
//! - **[`runtime_config`]** - environment-driven runtime knobs
//!
//! ## Request Handling Flow
//!
//! 1. The accept loop hands each connection its own `may` coroutine.
//! 2. The connection loop decodes one request (head, then body bytes by
//!    `Content-Length`, capped at the instance limit).
//! 3. The dispatcher parses query/cookies/form/structured body, resolves
//!    the most specific route, and builds the [`Request`] model with
//!    wildcard bindings merged into the URL parameters.
//! 4. The handler mutates a fresh [`Response`] seeded at status 200 and
//!    returns a [`HandlerResult`]; panics become 500s without disturbing
//!    other requests.
//! 5. The response is serialized once - instance default headers overlaid,
//!    cookies emitted as `Set-Cookie` - and written back in a single
//!    buffer.
//!
//! ## Quick Start
//!
//! ```no_run
//! use gantry::{HandlerResult, Instance};
//!
//! # fn main() -> Result<(), gantry::ServerError> {
//! let mut instance = Instance::new(8080);
//! instance.add_endpoint(
//!     "GET",
//!     "/hello",
//!     "/:name",
//!     |req, resp, _ctx| {
//!         let name = req.get_url_param("name").unwrap_or("world");
//!         resp.set_body(format!("Hello {name}!"));
//!         HandlerResult::Continue
//!     },
//!     None,
//! )?;
//! instance.start()?;
//! // ... block until shutdown is requested ...
//! instance.stop()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! gantry runs on the `may` coroutine runtime, not tokio: handlers are
//! plain blocking-style functions executed on lightweight coroutines, one
//! per connection. The routing table and default headers are frozen at
//! `start` and shared read-only; request and response values are owned by
//! the coroutine serving that request. Handlers that share external state
//! through their context value synchronize it themselves - the core takes
//! no locks while a handler runs.
//!
//! Coroutine stack size is configurable via `GANTRY_STACK_SIZE`; see
//! [`runtime_config`] for the full list of knobs.

pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod instance;
pub mod multimap;
pub mod router;
pub mod runtime_config;
pub mod server;

pub use codec::{BodyCodec, JsonCodec};
pub use dispatcher::{
    Body, Dispatcher, HandlerFn, HandlerResult, Request, Response, SetCookie, MAX_FALLTHROUGH,
};
pub use error::ServerError;
pub use instance::{Instance, DEFAULT_MAX_BODY_SIZE};
pub use multimap::MultiMap;
pub use router::{PathPattern, Route, RouteMatch, Router};
pub use runtime_config::RuntimeConfig;
pub use server::{RawRequest, RawResponse, ServerHandle};

//! # Router Module
//!
//! Path matching and route resolution. The host registers endpoints as
//! `(verb, pattern, handler, context)` tuples through the instance; the
//! router freezes them into an immutable table at `start` and resolves
//! every incoming `(method, path)` pair to the most specific match.
//!
//! ## Matching
//!
//! Patterns mix literal segments with named wildcards (`/pets/:id`).
//! Matching requires identical segment counts; a wildcard binds one
//! non-empty segment. Overlapping patterns resolve deterministically:
//! more literal segments win, an exact verb beats a verb-agnostic
//! registration, and remaining ties go to the first route registered.
//!
//! ## Example
//!
//! ```rust,ignore
//! let m = router.resolve(&Method::GET, "/test/alice", &[]).unwrap();
//! assert_eq!(m.route.pattern.raw(), "/test/:foo");
//! assert_eq!(m.bindings[0], ("foo".into(), "alice".into()));
//! ```

mod core;
pub mod pattern;

pub use core::{Route, RouteMatch, Router};
pub use pattern::{split_path, BindingVec, PathPattern, Segment, MAX_INLINE_PARAMS};

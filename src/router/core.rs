//! Router core - hot path for route resolution.

use super::pattern::{split_path, BindingVec, PathPattern};
use crate::dispatcher::HandlerFn;
use http::Method;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One registered endpoint: verb, pattern, handler, and the host's opaque
/// context value. Immutable once the table is frozen at `start`.
#[derive(Clone)]
pub struct Route {
    /// `None` matches any verb (registered with `"*"`).
    pub verb: Option<Method>,
    pub pattern: PathPattern,
    pub handler: HandlerFn,
    /// Stored verbatim for the handler; never inspected by the core.
    pub context: Option<Arc<dyn Any + Send + Sync>>,
    /// Registration order; the final tie-break in specificity ranking and
    /// the identity used to exclude routes on fall-through retries.
    pub index: usize,
    pub is_default: bool,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("verb", &self.verb)
            .field("pattern", &self.pattern.raw())
            .field("index", &self.index)
            .field("is_default", &self.is_default)
            .finish_non_exhaustive()
    }
}

/// Result of resolving a request path against the table: the winning route
/// plus its extracted wildcard bindings.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub bindings: BindingVec,
}

/// Immutable routing table shared by every connection coroutine.
///
/// Resolution is a linear scan with specificity ranking; the table is
/// small, frozen at `start`, and read concurrently without locks.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Arc<Route>>,
    default_route: Option<Arc<Route>>,
}

impl Router {
    /// Freeze a routing table from registered routes and the optional
    /// default route.
    #[must_use]
    pub fn new(routes: Vec<Route>, default_route: Option<Route>) -> Self {
        let routes: Vec<Arc<Route>> = routes.into_iter().map(Arc::new).collect();
        let routes_summary: Vec<String> = routes
            .iter()
            .take(10)
            .map(|r| {
                format!(
                    "{} {}",
                    r.verb.as_ref().map_or("*", Method::as_str),
                    r.pattern.raw()
                )
            })
            .collect();
        info!(
            routes_count = routes.len(),
            has_default = default_route.is_some(),
            routes_summary = ?routes_summary,
            "Routing table frozen"
        );
        Self {
            routes,
            default_route: default_route.map(Arc::new),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Resolve a request to the most specific matching route.
    ///
    /// Candidates are routes whose verb equals the request method (or is
    /// verb-agnostic) and whose pattern matches the path with identical
    /// segment count. The winner maximizes, in order:
    ///
    /// 1. literal segment count - an exact literal always outranks a
    ///    wildcard at the same position, since candidates share one length;
    /// 2. verb exactness - an exact-verb route over a verb-agnostic one;
    /// 3. registration order - first registered wins.
    ///
    /// `excluded` lists route indexes already tried in this dispatch; they
    /// are skipped so a fall-through retry lands on the next-best route.
    /// The default route is *not* consulted here - see
    /// [`Router::default_route`].
    #[must_use]
    pub fn resolve(&self, method: &Method, path: &str, excluded: &[usize]) -> Option<RouteMatch> {
        debug!(method = %method, path = %path, excluded = excluded.len(), "Route match attempt");
        let match_start = Instant::now();
        let segments = split_path(path);

        let mut best: Option<(RouteMatch, usize, bool)> = None;
        for route in &self.routes {
            if excluded.contains(&route.index) {
                continue;
            }
            let verb_exact = match &route.verb {
                Some(verb) => {
                    if verb != method {
                        continue;
                    }
                    true
                }
                None => false,
            };
            let Some(bindings) = route.pattern.matches(&segments) else {
                continue;
            };
            let literals = route.pattern.literal_count();
            let better = match &best {
                None => true,
                Some((_, best_literals, best_exact)) => {
                    literals > *best_literals || (literals == *best_literals && verb_exact && !best_exact)
                }
            };
            if better {
                best = Some((
                    RouteMatch {
                        route: Arc::clone(route),
                        bindings,
                    },
                    literals,
                    verb_exact,
                ));
            }
        }

        let match_duration = match_start.elapsed();
        match best {
            Some((m, _, _)) => {
                if match_duration.as_millis() > 1 {
                    warn!(
                        method = %method,
                        path = %path,
                        route_pattern = %m.route.pattern.raw(),
                        duration_us = match_duration.as_micros() as u64,
                        "Slow route matching detected"
                    );
                } else {
                    info!(
                        method = %method,
                        path = %path,
                        route_pattern = %m.route.pattern.raw(),
                        bindings = ?m.bindings,
                        duration_us = match_duration.as_micros() as u64,
                        "Route matched"
                    );
                }
                Some(m)
            }
            None => {
                warn!(
                    method = %method,
                    path = %path,
                    duration_us = match_duration.as_micros() as u64,
                    "No route matched"
                );
                None
            }
        }
    }

    /// The registered default/fallback route, if any, as a match with no
    /// bindings.
    #[must_use]
    pub fn default_route(&self) -> Option<RouteMatch> {
        self.default_route.as_ref().map(|route| RouteMatch {
            route: Arc::clone(route),
            bindings: BindingVec::new(),
        })
    }
}

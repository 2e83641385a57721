//! Path pattern parsing, matching, and specificity ranking.
//!
//! A pattern is an ordered list of segments; each segment is either a
//! literal or a named wildcard written `:name`. A wildcard matches exactly
//! one non-empty path segment and binds its name to the matched value.
//! Segment counts must agree, so `/test/:foo` can never match
//! `/test/multiple/1/2/3`.
//!
//! When several patterns match one path, specificity decides: the pattern
//! with more literal segments (fewer wildcards) wins. The router breaks
//! remaining ties by verb exactness and registration order.

use crate::error::ServerError;
use smallvec::SmallVec;

/// Maximum wildcard bindings kept inline before heap allocation. REST-style
/// surfaces rarely nest more than a handful of path parameters.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated storage for wildcard bindings extracted during a match.
pub type BindingVec = SmallVec<[(String, String); MAX_INLINE_PARAMS]>;

/// One element of a parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches only an identical path segment.
    Literal(String),
    /// Matches any single non-empty segment, binding it under the name.
    Param(String),
}

/// A parsed, immutable path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
    literal_count: usize,
}

impl PathPattern {
    /// Parse a pattern from the registration-time `prefix` and `suffix`
    /// strings, joined with `/`. Empty segments (doubled or trailing
    /// slashes) are dropped, so `"/test/"` + `"/:foo"` equals
    /// `"/test/:foo"`. A wildcard marker without a name (`:`) is rejected.
    pub fn parse(prefix: &str, suffix: &str) -> Result<Self, ServerError> {
        let joined = format!("{}/{}", prefix, suffix);
        let mut segments = Vec::new();
        let mut literal_count = 0;
        for part in joined.split('/').filter(|s| !s.is_empty()) {
            if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(ServerError::InvalidPattern(joined));
                }
                segments.push(Segment::Param(name.to_string()));
            } else {
                literal_count += 1;
                segments.push(Segment::Literal(part.to_string()));
            }
        }
        let raw = if segments.is_empty() {
            "/".to_string()
        } else {
            let mut raw = String::new();
            for seg in &segments {
                raw.push('/');
                match seg {
                    Segment::Literal(s) => raw.push_str(s),
                    Segment::Param(name) => {
                        raw.push(':');
                        raw.push_str(name);
                    }
                }
            }
            raw
        };
        Ok(PathPattern {
            raw,
            segments,
            literal_count,
        })
    }

    /// Canonical textual form, e.g. `/test/:foo`.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Number of literal segments; the specificity rank.
    #[must_use]
    pub fn literal_count(&self) -> usize {
        self.literal_count
    }

    #[must_use]
    pub fn wildcard_count(&self) -> usize {
        self.segments.len() - self.literal_count
    }

    /// Match against pre-split path segments. Returns the wildcard bindings
    /// on success; `None` when the segment counts differ or any literal
    /// disagrees.
    #[must_use]
    pub fn matches(&self, path_segments: &[&str]) -> Option<BindingVec> {
        if path_segments.len() != self.segments.len() {
            return None;
        }
        let mut bindings = BindingVec::new();
        for (pattern_seg, path_seg) in self.segments.iter().zip(path_segments) {
            match pattern_seg {
                Segment::Literal(lit) => {
                    if lit != path_seg {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    if path_seg.is_empty() {
                        return None;
                    }
                    bindings.push((name.clone(), (*path_seg).to_string()));
                }
            }
        }
        Some(bindings)
    }
}

/// Split a normalized path into non-empty segments. `/` yields no
/// segments, matching the zero-segment root pattern.
#[must_use]
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_joins_prefix_and_suffix() {
        let p = PathPattern::parse("/test", "/multiple/:a/:b/:c").unwrap();
        assert_eq!(p.raw(), "/test/multiple/:a/:b/:c");
        assert_eq!(p.segment_count(), 5);
        assert_eq!(p.literal_count(), 2);
        assert_eq!(p.wildcard_count(), 3);
    }

    #[test]
    fn test_parse_drops_empty_segments() {
        let p = PathPattern::parse("/test/", "//:foo").unwrap();
        assert_eq!(p.raw(), "/test/:foo");
    }

    #[test]
    fn test_parse_rejects_unnamed_wildcard() {
        assert!(matches!(
            PathPattern::parse("/test", "/:"),
            Err(ServerError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_root_pattern() {
        let p = PathPattern::parse("", "").unwrap();
        assert_eq!(p.raw(), "/");
        assert!(p.matches(&split_path("/")).is_some());
        assert!(p.matches(&split_path("/x")).is_none());
    }

    #[test]
    fn test_literal_match_requires_identity() {
        let p = PathPattern::parse("/test", "").unwrap();
        assert!(p.matches(&["test"]).is_some());
        assert!(p.matches(&["other"]).is_none());
    }

    #[test]
    fn test_wildcard_binds_value() {
        let p = PathPattern::parse("/test", "/:foo").unwrap();
        let bindings = p.matches(&["test", "alice"]).unwrap();
        assert_eq!(bindings.as_slice(), &[("foo".to_string(), "alice".to_string())]);
    }

    #[test]
    fn test_segment_count_mismatch_never_matches() {
        let p = PathPattern::parse("/test", "/:foo").unwrap();
        assert!(p.matches(&["test"]).is_none());
        assert!(p.matches(&["test", "a", "b"]).is_none());
    }
}

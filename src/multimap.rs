//! Insertion-ordered multi-map for request/response key-value data.
//!
//! One container backs URL parameters, headers, cookies, and form fields.
//! It preserves insertion order, allows duplicate keys, and (in header
//! mode) compares keys ASCII-case-insensitively while keeping the original
//! case for enumeration.
//!
//! Lookup policy: `get` returns the value of the *first* matching pair
//! inserted; `put` always appends and never overwrites; `remove` drops
//! every pair with a matching key. `get_all` exposes duplicates in order.

use smallvec::SmallVec;

/// Entries kept inline before spilling to the heap. Typical requests carry
/// well under 16 headers/params.
pub const MAX_INLINE_ENTRIES: usize = 16;

type EntryVec = SmallVec<[(String, String); MAX_INLINE_ENTRIES]>;

/// Ordered key/value container with duplicate keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiMap {
    entries: EntryVec,
    ignore_case: bool,
}

impl MultiMap {
    /// Empty map with exact key comparison (URL params, cookies, form
    /// fields).
    #[must_use]
    pub fn new() -> Self {
        MultiMap {
            entries: EntryVec::new(),
            ignore_case: false,
        }
    }

    /// Empty map with ASCII-case-insensitive key comparison for `get`,
    /// `get_all`, `contains_key`, and `remove`. Inserted key case is
    /// preserved and visible through `iter`.
    #[must_use]
    pub fn for_headers() -> Self {
        MultiMap {
            entries: EntryVec::new(),
            ignore_case: true,
        }
    }

    fn key_eq(&self, stored: &str, probe: &str) -> bool {
        if self.ignore_case {
            stored.eq_ignore_ascii_case(probe)
        } else {
            stored == probe
        }
    }

    /// Append a pair. Existing pairs with the same key are left untouched.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Value of the first pair inserted under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| self.key_eq(k, key))
            .map(|(_, v)| v.as_str())
    }

    /// Every value stored under `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| self.key_eq(k, key))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| self.key_eq(k, key))
    }

    /// Remove every pair stored under `key`; returns how many were removed.
    pub fn remove(&mut self, key: &str) -> usize {
        let before = self.entries.len();
        // retain can't borrow self for key_eq, so capture the mode first
        let ignore_case = self.ignore_case;
        self.entries.retain(|(k, _)| {
            if ignore_case {
                !k.eq_ignore_ascii_case(key)
            } else {
                k != key
            }
        });
        before - self.entries.len()
    }

    /// Pairs in insertion order, duplicates preserved.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overlay this map on top of `defaults`: defaults whose key has no
    /// entry here come first, then every pair of this map. On key collision
    /// the values in `self` win, which is the merge rule for explicit
    /// response headers over instance default headers.
    #[must_use]
    pub fn merge_over(&self, defaults: &MultiMap) -> MultiMap {
        let mut merged = if self.ignore_case || defaults.ignore_case {
            MultiMap::for_headers()
        } else {
            MultiMap::new()
        };
        for (k, v) in defaults.iter() {
            if !self.contains_key(k) {
                merged.put(k, v);
            }
        }
        for (k, v) in self.iter() {
            merged.put(k, v);
        }
        merged
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MultiMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = MultiMap::new();
        for (k, v) in iter {
            map.put(k, v);
        }
        map
    }
}

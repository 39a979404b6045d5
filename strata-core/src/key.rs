//! Namespaced cache keys.
//!
//! A stored key is always `namespace + ":" + user_key`. The only way to build
//! one is [`CacheKey::new`], which takes the namespace explicitly, so two
//! callers using the same user key in different namespaces can never collide.
//!
//! User keys may contain `:` freely. Inside a namespace, `%` and `:` are
//! percent-escaped, so the first `:` of a composed key always ends the
//! namespace and namespace `"a"` never matches keys of namespace `"a:b"`.

use std::borrow::Cow;
use std::fmt;

/// Separator between namespace and user key.
pub const NAMESPACE_SEPARATOR: char = ':';

const ESCAPE: char = '%';

/// Namespace as it appears in a composed key.
fn escape_namespace(namespace: &str) -> Cow<'_, str> {
    if !namespace.contains(&[NAMESPACE_SEPARATOR, ESCAPE][..]) {
        return Cow::Borrowed(namespace);
    }
    let mut escaped = String::with_capacity(namespace.len() + 4);
    for c in namespace.chars() {
        match c {
            ESCAPE => escaped.push_str("%25"),
            NAMESPACE_SEPARATOR => escaped.push_str("%3A"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Namespace used when the caller does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// A composite `namespace:key` cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    composed: String,
    namespace_len: usize,
}

impl CacheKey {
    /// Compose a key from a namespace and a user key.
    pub fn new(namespace: &str, key: &str) -> Self {
        let namespace = escape_namespace(namespace);
        let mut composed = String::with_capacity(namespace.len() + 1 + key.len());
        composed.push_str(&namespace);
        composed.push(NAMESPACE_SEPARATOR);
        composed.push_str(key);
        Self {
            composed,
            namespace_len: namespace.len(),
        }
    }

    /// The namespace half of the key, with `%` and `:` escaped.
    pub fn namespace(&self) -> &str {
        &self.composed[..self.namespace_len]
    }

    /// The caller-supplied half of the key.
    pub fn user_key(&self) -> &str {
        &self.composed[self.namespace_len + 1..]
    }

    /// The full `namespace:key` string as stored in a tier.
    pub fn as_str(&self) -> &str {
        &self.composed
    }

    pub fn into_string(self) -> String {
        self.composed
    }

    /// Prefix shared by every key in a namespace.
    pub fn namespace_prefix(namespace: &str) -> String {
        format!("{}{NAMESPACE_SEPARATOR}", escape_namespace(namespace))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.composed)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.composed
    }
}

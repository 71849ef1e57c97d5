//! Header map with case-insensitive name lookup (RFC 9110 §5).

use std::fmt;

/// A case-insensitive, multi-value header map that preserves insertion order.
///
/// # Examples
///
/// ```
/// use boardshelf::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Authorization", "Bearer abc.def.ghi");
///
/// assert_eq!(headers.bearer_token(), Some("abc.def.ghi"));
/// assert_eq!(headers.get("authorization"), Some("Bearer abc.def.ghi"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry. Multiple values for the same name are preserved.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Returns the first value for `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if at least one entry is named `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Extracts the credential from an `Authorization: Bearer <token>` header.
    ///
    /// The scheme is matched case-insensitively; an empty credential yields `None`.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.get("authorization")?.trim();
        let (scheme, token) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    }

    /// Total number of entries (not unique names).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_get() {
        let mut h = Headers::new();
        h.insert("Content-Type", "application/json");
        assert_eq!(h.get("content-type"), Some("application/json"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("application/json"));
        assert!(h.contains("Content-type"));
    }

    #[test]
    fn bearer_token_extraction() {
        let mut h = Headers::new();
        h.insert("authorization", "bearer   tok123 ");
        assert_eq!(h.bearer_token(), Some("tok123"));
    }

    #[test]
    fn bearer_token_rejects_other_schemes() {
        let mut h = Headers::new();
        h.insert("Authorization", "Basic dXNlcjpwYXNz");
        assert_eq!(h.bearer_token(), None);

        let mut empty = Headers::new();
        empty.insert("Authorization", "Bearer ");
        assert_eq!(empty.bearer_token(), None);
        assert_eq!(Headers::new().bearer_token(), None);
    }
}

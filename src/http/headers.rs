//! HTTP header map with case-insensitive name lookup.

use std::fmt;

/// A case-insensitive, order-preserving HTTP header list.
///
/// # Examples
///
/// ```
/// use zyvora::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Content-Type", "audio/webm; codecs=opus");
///
/// assert_eq!(headers.get("content-type"), Some("audio/webm; codecs=opus"));
/// assert_eq!(headers.mime_type().as_deref(), Some("audio/webm"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header list.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry. Repeated names are kept.
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

    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Returns the lowercased media type of `Content-Type` without its
    /// parameters, e.g. `audio/webm` for `audio/webm; codecs=opus`.
    pub fn mime_type(&self) -> Option<String> {
        let raw = self.get("content-type")?;
        let essence = raw.split(';').next().unwrap_or("").trim();
        if essence.is_empty() {
            None
        } else {
            Some(essence.to_ascii_lowercase())
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
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
        h.insert("X-Goog-Api-Key", "secret");
        assert_eq!(h.get("x-goog-api-key"), Some("secret"));
        assert!(h.contains("X-GOOG-API-KEY"));
        assert!(!h.contains("authorization"));
    }

    #[test]
    fn mime_type_strips_parameters() {
        let mut h = Headers::new();
        h.insert("Content-Type", "Application/X-WWW-Form-Urlencoded; charset=UTF-8");
        assert_eq!(
            h.mime_type().as_deref(),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn mime_type_absent_or_blank() {
        let mut h = Headers::new();
        assert_eq!(h.mime_type(), None);
        h.insert("Content-Type", " ; charset=utf-8");
        assert_eq!(h.mime_type(), None);
    }

    #[test]
    fn display_is_wire_format() {
        let mut h = Headers::new();
        h.insert("Allow", "GET, POST");
        h.insert("Retry-After", "30");
        assert_eq!(h.to_string(), "Allow: GET, POST\r\nRetry-After: 30\r\n");
        assert_eq!(h.len(), 2);
    }
}

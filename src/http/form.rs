//! `application/x-www-form-urlencoded` decoding for HTML form posts and
//! query strings.

use std::collections::HashMap;

use percent_encoding::percent_decode_str;

/// Decoded form fields. When a key repeats, the last value wins.
///
/// # Examples
///
/// ```
/// use zyvora::http::FormData;
///
/// let form = FormData::parse("message=what+is+photosynthesis%3F&lang=en");
/// assert_eq!(form.get("message"), Some("what is photosynthesis?"));
/// assert_eq!(form.get("lang"), Some("en"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    fields: HashMap<String, String>,
}

impl FormData {
    /// Parses an urlencoded string. Malformed UTF-8 sequences are replaced
    /// with U+FFFD rather than rejected.
    pub fn parse(input: &str) -> Self {
        let fields = input
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let mut parts = pair.splitn(2, '=');
                let key = decode(parts.next().unwrap_or(""));
                let value = decode(parts.next().unwrap_or(""));
                (key, value)
            })
            .collect();
        Self { fields }
    }

    /// Parses a request body, treating invalid UTF-8 lossily.
    pub fn from_bytes(body: &[u8]) -> Self {
        Self::parse(&String::from_utf8_lossy(body))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plus_and_percent() {
        let form = FormData::parse("q=a+b%2Bc%26d");
        assert_eq!(form.get("q"), Some("a b+c&d"));
    }

    #[test]
    fn decodes_multibyte_utf8() {
        let form = FormData::parse("message=%E0%A4%A8%E0%A4%AE%E0%A4%B8%E0%A5%8D%E0%A4%A4%E0%A5%87");
        assert_eq!(form.get("message"), Some("नमस्ते"));
    }

    #[test]
    fn key_without_value_is_empty_string() {
        let form = FormData::parse("message&x=1");
        assert_eq!(form.get("message"), Some(""));
        assert_eq!(form.get("x"), Some("1"));
    }

    #[test]
    fn empty_input_has_no_fields() {
        assert_eq!(FormData::parse(""), FormData::default());
        assert_eq!(FormData::parse("&&"), FormData::default());
    }

    #[test]
    fn last_duplicate_wins() {
        let form = FormData::parse("a=1&a=2");
        assert_eq!(form.get("a"), Some("2"));
    }
}

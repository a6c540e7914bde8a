use std::fmt;

use sha2::{Digest, Sha256};
use url::Url;

use crate::domain::OutputFormat;

/// Cache key for one (target, output format) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(url: &Url, format: OutputFormat) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"cleanweb:");
        hasher.update(Self::normalize(url).as_bytes());
        hasher.update(b":");
        hasher.update(format.as_str().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Parsed form of the url without its fragment. Scheme and host are
    /// already lowercased and default ports elided by the parser.
    pub fn normalize(url: &Url) -> String {
        let mut url = url.clone();
        url.set_fragment(None);
        url.into()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(url: &str, format: OutputFormat) -> CacheKey {
        CacheKey::new(&Url::parse(url).unwrap(), format)
    }

    #[test]
    fn test_key_deterministic() {
        assert_eq!(
            key("https://example.com/post", OutputFormat::Html),
            key("https://example.com/post", OutputFormat::Html)
        );
    }

    #[test]
    fn test_key_differs_by_format() {
        assert_ne!(
            key("https://example.com/post", OutputFormat::Html),
            key("https://example.com/post", OutputFormat::Markdown)
        );
    }

    #[test]
    fn test_key_differs_by_target() {
        assert_ne!(
            key("https://example.com/a", OutputFormat::Html),
            key("https://example.com/b", OutputFormat::Html)
        );
    }

    #[test]
    fn test_key_normalizes_equivalent_urls() {
        let base = key("https://example.com/", OutputFormat::Html);
        assert_eq!(base, key("HTTPS://EXAMPLE.com", OutputFormat::Html));
        assert_eq!(base, key("https://example.com:443/", OutputFormat::Html));
        assert_eq!(base, key("https://example.com/#top", OutputFormat::Html));
    }

    #[test]
    fn test_key_keeps_query() {
        assert_ne!(
            key("https://example.com/p?id=1", OutputFormat::Html),
            key("https://example.com/p?id=2", OutputFormat::Html)
        );
    }

    #[test]
    fn test_key_is_hex_sha256() {
        let k = key("https://example.com/post", OutputFormat::Markdown);
        assert_eq!(k.as_str().len(), 64);
        assert!(k.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}

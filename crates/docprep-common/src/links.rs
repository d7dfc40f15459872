//! Link URI validation and normalization
//!
//! Link items are identified by their URI, so two spellings of the same
//! address must normalize to the same string before they are compared or
//! persisted.

use url::Url;

use crate::error::{DocprepError, Result};

/// Validate a link URI and return its normalized form.
///
/// Only `http` and `https` links are accepted. Normalization lowercases the
/// scheme and host and strips surrounding whitespace, so equivalent spellings
/// map to the same identity.
pub fn normalize_link(uri: &str) -> Result<String> {
    let trimmed = uri.trim();
    if trimmed.is_empty() {
        return Err(DocprepError::InvalidLink("empty link".to_string()));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| DocprepError::InvalidLink(format!("{}: {}", trimmed, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url.to_string()),
        other => Err(DocprepError::InvalidLink(format!(
            "unsupported scheme '{}' in {}",
            other, trimmed
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_accepts_http_and_https() {
        assert_eq!(
            normalize_link("https://example.com/docs").unwrap(),
            "https://example.com/docs"
        );
        assert_eq!(
            normalize_link("http://example.com/docs").unwrap(),
            "http://example.com/docs"
        );
    }

    #[test]
    fn test_normalize_is_case_and_whitespace_insensitive() {
        assert_eq!(
            normalize_link("  HTTPS://Example.COM/Docs  ").unwrap(),
            "https://example.com/Docs"
        );
    }

    #[test]
    fn test_normalize_rejects_other_schemes() {
        assert!(normalize_link("ftp://example.com/file").is_err());
        assert!(normalize_link("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_link("").is_err());
        assert!(normalize_link("   ").is_err());
        assert!(normalize_link("not a url").is_err());
    }
}

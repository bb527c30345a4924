//! Long URL validation and normalization.
//!
//! Only absolute `http`/`https` URLs with a host are accepted. Accepted URLs are
//! stored in a canonical form so that the redirect target is predictable.

use url::Url;

/// Longest URL accepted for shortening.
pub const MAX_URL_LENGTH: usize = 2048;

/// Errors that can occur during URL normalization.
#[derive(Debug, thiserror::Error)]
pub enum UrlNormalizationError {
    #[error("URL must not be empty")]
    Empty,

    #[error("URL exceeds {MAX_URL_LENGTH} characters")]
    TooLong,

    #[error("Invalid URL format: {0}")]
    InvalidFormat(String),

    #[error("Only HTTP and HTTPS protocols are allowed")]
    UnsupportedProtocol,

    #[error("URL must contain a host")]
    MissingHost,

    #[error("Failed to normalize URL: {0}")]
    NormalizationFailed(String),
}

/// Validates `input` and returns its canonical form.
///
/// # Normalization Rules
///
/// 1. Surrounding whitespace is trimmed
/// 2. Only `http` and `https` are allowed (no `javascript:`, `data:`, `file:`)
/// 3. Hostname is lower-cased
/// 4. Default ports (80 / 443) and fragments are removed
/// 5. Path and query are preserved as-is
///
/// # Examples
///
/// ```ignore
/// assert_eq!(
///     normalize_url("HTTPS://EXAMPLE.COM:443/a#top").unwrap(),
///     "https://example.com/a"
/// );
/// ```
pub fn normalize_url(input: &str) -> Result<String, UrlNormalizationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(UrlNormalizationError::Empty);
    }
    if input.len() > MAX_URL_LENGTH {
        return Err(UrlNormalizationError::TooLong);
    }

    let mut url =
        Url::parse(input).map_err(|e| UrlNormalizationError::InvalidFormat(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        _ => return Err(UrlNormalizationError::UnsupportedProtocol),
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or(UrlNormalizationError::MissingHost)?
        .to_ascii_lowercase();
    url.set_host(Some(&host)).map_err(|_| {
        UrlNormalizationError::NormalizationFailed("Failed to set normalized host".to_string())
    })?;

    url.set_fragment(None);

    let is_default_port = matches!(
        (url.scheme(), url.port()),
        ("http", Some(80)) | ("https", Some(443))
    );
    if is_default_port {
        url.set_port(None).map_err(|_| {
            UrlNormalizationError::NormalizationFailed("Failed to remove default port".to_string())
        })?;
    }

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_keeps_path_and_query() {
        assert_eq!(
            normalize_url("https://example.com/a?x=1&y=2").unwrap(),
            "https://example.com/a?x=1&y=2"
        );
    }

    #[test]
    fn test_normalize_bare_host_gets_root_path() {
        assert_eq!(normalize_url("https://example.com").unwrap(), "https://example.com/");
    }

    #[test]
    fn test_normalize_lowercases_host_only() {
        assert_eq!(
            normalize_url("https://EXAMPLE.COM/Path").unwrap(),
            "https://example.com/Path"
        );
    }

    #[test]
    fn test_normalize_removes_default_ports() {
        assert_eq!(
            normalize_url("http://example.com:80/p").unwrap(),
            "http://example.com/p"
        );
        assert_eq!(
            normalize_url("https://example.com:443/p").unwrap(),
            "https://example.com/p"
        );
        assert_eq!(
            normalize_url("http://example.com:8080/p").unwrap(),
            "http://example.com:8080/p"
        );
    }

    #[test]
    fn test_normalize_removes_fragment() {
        assert_eq!(
            normalize_url("https://example.com/page?k=v#section").unwrap(),
            "https://example.com/page?k=v"
        );
    }

    #[test]
    fn test_normalize_trims_whitespace() {
        assert_eq!(
            normalize_url("  https://example.com/a \n").unwrap(),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_reject_empty() {
        assert!(matches!(normalize_url(""), Err(UrlNormalizationError::Empty)));
        assert!(matches!(normalize_url("   "), Err(UrlNormalizationError::Empty)));
    }

    #[test]
    fn test_reject_relative_url() {
        assert!(matches!(
            normalize_url("example.com/a"),
            Err(UrlNormalizationError::InvalidFormat(_))
        ));
        assert!(matches!(
            normalize_url("/just/a/path"),
            Err(UrlNormalizationError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_reject_dangerous_schemes() {
        for input in [
            "javascript:alert('xss')",
            "data:text/plain,Hello",
            "file:///etc/passwd",
            "ftp://example.com/file.txt",
            "mailto:test@example.com",
        ] {
            assert!(
                matches!(normalize_url(input), Err(UrlNormalizationError::UnsupportedProtocol)),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn test_reject_too_long() {
        let url = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert!(matches!(normalize_url(&url), Err(UrlNormalizationError::TooLong)));
    }

    #[test]
    fn test_accept_ip_and_localhost() {
        assert_eq!(
            normalize_url("http://192.168.1.1:8080/api").unwrap(),
            "http://192.168.1.1:8080/api"
        );
        assert_eq!(
            normalize_url("http://localhost:3000/test").unwrap(),
            "http://localhost:3000/test"
        );
    }
}

//! Target URL validation and normalization.
//!
//! # Responsibilities
//! - Accept only absolute `http://` / `https://` targets
//! - Reattach the inbound query string to the target
//! - Percent-decode the combined URL
//!
//! # Design Decisions
//! - The scheme check is a plain prefix match; anything else is rejected
//! - Queries are concatenated, never merged or deduplicated
//! - The `url` query parameter names the target and is never forwarded

use axum::http::Uri;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::relay::error::ProxyError;

/// Query parameter that carries the target URL on `/proxy?url=...` and `/file?url=...`.
pub const TARGET_PARAM: &str = "url";

/// Returns true if `raw` starts with an explicit `http://` or `https://` scheme.
pub fn is_valid_target(raw: &str) -> bool {
    raw.starts_with("http://") || raw.starts_with("https://")
}

/// Append `?<inbound_query>` to `raw` (when present) and percent-decode the result.
///
/// If `raw` already carries a query the two are joined as-is, producing
/// `raw?inbound_query` even when `raw` contains a `?`.
pub fn normalize(inbound_query: Option<&str>, raw: &str) -> String {
    let mut url = raw.to_string();
    if let Some(query) = inbound_query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    percent_decode_str(&url).decode_utf8_lossy().into_owned()
}

/// A normalized target string together with its parsed form.
///
/// The string is kept as-is for error messages; parsing may add a trailing `/`.
#[derive(Debug, Clone)]
pub struct NormalizedTarget {
    raw: String,
    url: Url,
}

impl NormalizedTarget {
    /// Parse the output of [`normalize`].
    pub fn parse(raw: String) -> Result<Self, ProxyError> {
        match Url::parse(&raw) {
            Ok(url) => Ok(Self { raw, url }),
            Err(e) => Err(ProxyError::bad_request_url(raw, &e)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// The inbound query string with every `url=` pair removed, or `None` if nothing remains.
///
/// Pairs are kept in their original (still encoded) form.
pub fn inbound_query(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty() && !is_target_pair(pair))
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept.join("&"))
    }
}

/// The decoded value of the `url` query parameter, if any.
pub fn query_target(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == TARGET_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// The decoded target embedded in the path after `prefix` (e.g. `/proxy/https://host/x`).
///
/// Percent-encoded suffixes (`/proxy/https%3A%2F%2Fhost%2Fx`) decode to the same target
/// as the `url` query parameter would.
pub fn path_target(uri: &Uri, prefix: &str) -> Option<String> {
    uri.path()
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
        .map(|rest| percent_decode_str(rest).decode_utf8_lossy().into_owned())
}

fn is_target_pair(pair: &str) -> bool {
    url::form_urlencoded::parse(pair.as_bytes())
        .next()
        .map(|(key, _)| key == TARGET_PARAM)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_validation() {
        assert!(is_valid_target("http://example.test"));
        assert!(is_valid_target("https://example.test/a?b=c"));

        assert!(!is_valid_target("ftp://example.test"));
        assert!(!is_valid_target("/relative/path"));
        assert!(!is_valid_target("example.test"));
        assert!(!is_valid_target("HTTP://example.test"));
        assert!(!is_valid_target("http:/example.test"));
        assert!(!is_valid_target(""));
    }

    #[test]
    fn test_normalize_appends_query() {
        assert_eq!(
            normalize(Some("a=1"), "http://example.test/path"),
            "http://example.test/path?a=1"
        );
        assert_eq!(normalize(None, "http://example.test/path"), "http://example.test/path");
        assert_eq!(normalize(Some(""), "http://example.test/path"), "http://example.test/path");
    }

    #[test]
    fn test_normalize_concatenates_existing_query() {
        assert_eq!(
            normalize(Some("a=1"), "http://example.test/path?b=2"),
            "http://example.test/path?b=2?a=1"
        );
    }

    #[test]
    fn test_normalize_percent_decodes() {
        assert_eq!(
            normalize(Some("q=hello%20world"), "http://example.test/a%2Fb"),
            "http://example.test/a/b?q=hello world"
        );
    }

    #[test]
    fn test_normalize_is_idempotent_on_its_output() {
        let once = normalize(Some("a=1"), "http://example.test/x%20y");
        let twice = normalize(None, &once);
        assert_eq!(once, twice);
        assert_eq!(is_valid_target(&once), is_valid_target(&twice));
    }

    #[test]
    fn test_inbound_query_strips_target_param() {
        let uri: Uri = "/proxy?url=http%3A%2F%2Fexample.test%2Fpath&a=1&b=2".parse().unwrap();
        assert_eq!(inbound_query(&uri).as_deref(), Some("a=1&b=2"));
        assert_eq!(query_target(&uri).as_deref(), Some("http://example.test/path"));

        let uri: Uri = "/proxy?url=http://example.test".parse().unwrap();
        assert_eq!(inbound_query(&uri), None);

        let uri: Uri = "/proxy/http://example.test".parse().unwrap();
        assert_eq!(inbound_query(&uri), None);
        assert_eq!(query_target(&uri), None);
    }

    #[test]
    fn test_path_target() {
        let uri: Uri = "/file/https://example.test/big.iso?x=1".parse().unwrap();
        assert_eq!(path_target(&uri, "/file").as_deref(), Some("https://example.test/big.iso"));
        assert_eq!(inbound_query(&uri).as_deref(), Some("x=1"));

        let uri: Uri = "/file/".parse().unwrap();
        assert_eq!(path_target(&uri, "/file"), None);

        let uri: Uri = "/proxy/http://example.test".parse().unwrap();
        assert_eq!(path_target(&uri, "/file"), None);
    }

    #[test]
    fn test_normalized_target_keeps_raw_text() {
        let target = NormalizedTarget::parse("http://example.test".to_string()).unwrap();
        assert_eq!(target.as_str(), "http://example.test");
        assert_eq!(target.url().as_str(), "http://example.test/");

        let err = NormalizedTarget::parse("http://".to_string()).unwrap_err();
        assert!(err.to_string().starts_with("Proxy http:// Error: "));
    }

    #[test]
    fn test_path_target_percent_decoded() {
        let uri: Uri = "/proxy/http%3A%2F%2Fexample.test%3A8080%2Fp".parse().unwrap();
        assert_eq!(path_target(&uri, "/proxy").as_deref(), Some("http://example.test:8080/p"));
        assert!(is_valid_target(&path_target(&uri, "/proxy").unwrap()));

        let uri: Uri = "/file/ftp%3A%2F%2Fexample.test".parse().unwrap();
        assert_eq!(path_target(&uri, "/file").as_deref(), Some("ftp://example.test"));
    }
}

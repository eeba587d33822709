//! URL handling module for Baton-Crawl
//!
//! The frontier stores paths, not full URLs: every path is resolved against
//! the crawl's base URL. This module normalizes discovered links and decides
//! which of them belong to the crawl.

mod normalize;

pub use normalize::normalize_url;

use crate::UrlError;
use normalize::normalize_path;
use url::Url;

/// Converts a discovered link into a frontier path, if it is in scope
///
/// A link is in scope when it has the same scheme, host and port as the base
/// URL, its path lies under the base URL's path, and (when keywords are
/// given) its path contains at least one keyword.
///
/// # Examples
///
/// ```
/// use baton_crawl::url::to_crawl_path;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/docs/").unwrap();
/// assert_eq!(
///     to_crawl_path(&base, "https://example.com/docs/intro/", &[]),
///     Some("/docs/intro".to_string())
/// );
/// assert_eq!(to_crawl_path(&base, "https://other.com/docs/intro", &[]), None);
/// assert_eq!(to_crawl_path(&base, "https://example.com/blog", &[]), None);
/// ```
pub fn to_crawl_path(base: &Url, link: &str, keywords: &[String]) -> Option<String> {
    let normalized = normalize_url(link).ok()?;

    if normalized.scheme() != base.scheme()
        || !hosts_match(base, &normalized)
        || normalized.port_or_known_default() != base.port_or_known_default()
    {
        return None;
    }

    let path = normalized.path().to_string();
    if !is_under(&normalize_path(base.path()), &path) {
        return None;
    }

    if !keywords.is_empty() && !keywords.iter().any(|k| path.contains(k.as_str())) {
        return None;
    }

    Some(path)
}

/// Resolves a frontier path against the base URL
pub fn resolve_path(base: &Url, path: &str) -> Result<Url, UrlError> {
    base.join(path)
        .map_err(|e| UrlError::Malformed(format!("Cannot resolve '{}': {}", path, e)))
}

/// Returns the frontier path of the base URL itself
pub fn base_path(base: &Url) -> String {
    normalize_path(base.path())
}

fn hosts_match(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

fn is_under(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

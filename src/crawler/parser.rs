//! HTML link extraction
//!
//! Workers only need the outgoing links of a page. Links come from
//! `<a href>` and `<link rel="canonical">`; anything that is not an
//! http(s) navigation target is dropped here, and scope filtering happens
//! later in [`crate::url::to_crawl_path`].

use scraper::{Html, Selector};
use url::Url;

/// Outgoing links of a fetched page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub title: Option<String>,

    /// Absolute URLs, first occurrence order, no duplicates
    pub links: Vec<String>,
}

/// Parses a page and resolves its links against `page_url`
///
/// Excluded: `download` anchors, `javascript:`, `mailto:`, `tel:` and
/// `data:` hrefs, same-page fragments, and anything that does not resolve
/// to http or https.
///
/// ```
/// use baton_crawl::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<title>Docs</title><a href="guide/">Guide</a>"#;
/// let page = Url::parse("https://example.com/docs/").unwrap();
/// let parsed = parse_html(html, &page);
/// assert_eq!(parsed.title.as_deref(), Some("Docs"));
/// assert_eq!(parsed.links, vec!["https://example.com/docs/guide/"]);
/// ```
pub fn parse_html(html: &str, page_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    let mut links: Vec<String> = Vec::new();
    for selector in ["a[href]", "link[rel='canonical'][href]"] {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };

        for element in document.select(&selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            let resolved = element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(href, page_url));

            if let Some(link) = resolved {
                if !links.contains(&link) {
                    links.push(link);
                }
            }
        }
    }

    ParsedPage {
        title: extract_title(&document),
        links,
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;

    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn resolve_link(href: &str, page_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    const SKIPPED: [&str; 4] = ["javascript:", "mailto:", "tel:", "data:"];
    let lower = href.to_ascii_lowercase();
    if SKIPPED.iter().any(|scheme| lower.starts_with(scheme)) {
        return None;
    }

    let mut absolute = page_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);

    Some(absolute.to_string())
}

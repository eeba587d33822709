use serde::{Deserialize, Serialize};
use url::Url;

use crate::UrlError;

/// Identity and addressing for one logical crawl
///
/// Created once when the crawl starts and passed unchanged through every
/// cycle, every staged batch and every continuation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlContext {
    /// Stable identifier, shared by all chained runs of the crawl
    pub crawl_id: String,

    /// Opaque handle to this crawl's partition of the frontier store
    pub frontier_store_address: String,

    /// Root URL that frontier paths are resolved against
    pub base_url: String,

    /// Optional filter applied to discovered paths
    #[serde(default)]
    pub path_keywords: Vec<String>,
}

impl CrawlContext {
    pub fn new(crawl_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        let crawl_id = crawl_id.into();
        Self {
            frontier_store_address: frontier_address_for(&crawl_id),
            crawl_id,
            base_url: base_url.into(),
            path_keywords: Vec::new(),
        }
    }

    pub fn with_path_keywords(mut self, keywords: Vec<String>) -> Self {
        self.path_keywords = keywords;
        self
    }

    /// Parses the base URL
    pub fn base(&self) -> Result<Url, UrlError> {
        Url::parse(&self.base_url).map_err(|e| UrlError::Parse(e.to_string()))
    }
}

/// Derives the frontier address used for a crawl
pub fn frontier_address_for(crawl_id: &str) -> String {
    format!("frontier:{}", crawl_id)
}

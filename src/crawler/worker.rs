//! Worker - visits one staged path
//!
//! A worker fetches the page behind a staged path, keeps the links that stay
//! inside the crawl's scope, feeds them back into the frontier and records
//! how the visit went. Page-level failures are recorded on the path and never
//! surface as errors; only storage failures do.

use crate::crawler::fetcher::{fetch_url, FetchResult};
use crate::crawler::parser::parse_html;
use crate::staging::StagedItem;
use crate::state::UrlState;
use crate::storage::{FrontierStore, SqliteStorage};
use crate::url::{resolve_path, to_crawl_path};
use crate::BatonError;
use reqwest::Client;
use std::sync::{Arc, Mutex};
use url::Url;

/// Storage handle shared between the orchestrator and its workers
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// What happened to a visited path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitOutcome {
    /// Fetched; `discovered` new paths were added to the frontier
    Visited { discovered: usize },
    Failed,
}

/// Visits a single staged item
pub async fn visit(
    client: &Client,
    storage: &SharedStorage,
    item: &StagedItem,
) -> Result<VisitOutcome, BatonError> {
    let ctx = &item.crawl_context;

    let target = ctx
        .base()
        .and_then(|base| resolve_path(&base, &item.path).map(|url| (base, url)));
    let (base, url) = match target {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::warn!("Cannot resolve path {}: {}", item.path, e);
            mark(storage, &ctx.frontier_store_address, &item.path, UrlState::Failed)?;
            return Ok(VisitOutcome::Failed);
        }
    };

    tracing::debug!("Visiting {}", url);

    let outcome = match fetch_url(client, url.as_str()).await {
        FetchResult::Success {
            final_url, body, ..
        } => {
            let page_url = Url::parse(&final_url).unwrap_or_else(|_| url.clone());
            let parsed = parse_html(&body, &page_url);

            let mut paths: Vec<String> = Vec::new();
            for link in &parsed.links {
                if let Some(path) = to_crawl_path(&base, link, &ctx.path_keywords) {
                    if !paths.contains(&path) {
                        paths.push(path);
                    }
                }
            }

            let discovered = {
                let mut storage = storage.lock().unwrap();
                storage.enqueue(&ctx.frontier_store_address, &paths)?
            };

            tracing::debug!(
                "{}: {} links, {} in scope, {} new",
                url,
                parsed.links.len(),
                paths.len(),
                discovered
            );
            VisitOutcome::Visited { discovered }
        }

        FetchResult::ContentMismatch { content_type } => {
            tracing::debug!("{} is {}, not following links", url, content_type);
            VisitOutcome::Visited { discovered: 0 }
        }

        FetchResult::HttpError { status_code } => {
            tracing::warn!("HTTP {} for {}", status_code, url);
            VisitOutcome::Failed
        }

        FetchResult::NetworkError { error } => {
            tracing::warn!("Failed to fetch {}: {}", url, error);
            VisitOutcome::Failed
        }
    };

    let state = match outcome {
        VisitOutcome::Visited { .. } => UrlState::Visited,
        VisitOutcome::Failed => UrlState::Failed,
    };
    mark(storage, &ctx.frontier_store_address, &item.path, state)?;

    Ok(outcome)
}

fn mark(
    storage: &SharedStorage,
    address: &str,
    path: &str,
    state: UrlState,
) -> Result<(), BatonError> {
    let mut storage = storage.lock().unwrap();
    storage.complete_path(address, path, state)?;
    Ok(())
}

//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlContext`: immutable identity of a crawl, carried by every cycle and staged item
//! - `ProgressEntry`: crawl-wide and run-local URL counters
//! - `UrlState`: lifecycle of a path in the frontier
//! - `FrontierBatch`: paths claimed by a single cycle

mod batch;
mod context;
mod progress;
mod url_state;

// Re-export main types
pub use batch::{claim_key_for, cycle_of_claim_key, FrontierBatch};
pub use context::{frontier_address_for, CrawlContext};
pub use progress::ProgressEntry;
pub use url_state::UrlState;

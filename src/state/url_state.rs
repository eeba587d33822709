/// Frontier entry states
///
/// A path is `Queued` when discovered, `Claimed` once a cycle takes it, and
/// ends as `Visited` or `Failed` after a worker handles it. Only `Queued`
/// paths are pending; the rest stay in the frontier table so a rediscovered
/// path is never queued twice.
use std::fmt;

/// Represents where a path is in the frontier lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlState {
    /// Discovered and waiting to be claimed
    Queued,

    /// Claimed by a cycle and handed to workers
    Claimed,

    /// A worker fetched the page and enqueued its links
    Visited,

    /// A worker could not fetch or parse the page
    Failed,
}

impl UrlState {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Claimed => "claimed",
            Self::Visited => "visited",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "claimed" => Some(Self::Claimed),
            "visited" => Some(Self::Visited),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all frontier states
    pub fn all_states() -> [Self; 4] {
        [Self::Queued, Self::Claimed, Self::Visited, Self::Failed]
    }
}

impl fmt::Display for UrlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

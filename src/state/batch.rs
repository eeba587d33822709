/// A batch of paths claimed from the frontier by one cycle
///
/// Once claimed, the paths belong to the cycle that holds `claim_key`; the
/// frontier never hands them to a claim made under a different key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierBatch {
    pub claim_key: String,
    pub paths: Vec<String>,
}

impl FrontierBatch {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Derives the claim key for a crawl's cycle
///
/// Deterministic, so a retried cycle presents the same key and gets back
/// the paths it already claimed.
pub fn claim_key_for(crawl_id: &str, cycle: u64) -> String {
    format!("{}#{}", crawl_id, cycle)
}

/// Recovers the cycle number from a key made by [`claim_key_for`]
pub fn cycle_of_claim_key(crawl_id: &str, claim_key: &str) -> Option<u64> {
    claim_key
        .strip_prefix(crawl_id)?
        .strip_prefix('#')?
        .parse()
        .ok()
}

use serde::{Deserialize, Serialize};

/// Crawl-wide progress counters, one entry per crawl
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub crawl_id: String,

    /// URLs claimed across every run of the crawl
    pub total_url_count: u64,

    /// URLs claimed by the current run only
    pub run_url_count: u64,

    /// Cycles committed so far across every run
    pub cycle: u64,
}

impl ProgressEntry {
    /// A zeroed entry for a crawl's first cycle
    pub fn new(crawl_id: impl Into<String>) -> Self {
        Self {
            crawl_id: crawl_id.into(),
            total_url_count: 0,
            run_url_count: 0,
            cycle: 0,
        }
    }

    /// Number the next committed cycle will carry
    pub fn next_cycle(&self) -> u64 {
        self.cycle + 1
    }

    /// Counts a claimed batch of `claimed` URLs and commits the cycle
    pub fn advance(&self, claimed: u64) -> Self {
        Self {
            crawl_id: self.crawl_id.clone(),
            total_url_count: self.total_url_count + claimed,
            run_url_count: self.run_url_count + claimed,
            cycle: self.next_cycle(),
        }
    }

    /// Entry seen by the first cycle of a continuation run
    pub fn start_continuation(&self) -> Self {
        Self {
            run_url_count: 0,
            ..self.clone()
        }
    }

    /// Whether the run has claimed more URLs than it may
    pub fn exceeds(&self, run_url_threshold: u64) -> bool {
        self.run_url_count > run_url_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let entry = ProgressEntry::new("abc");
        assert_eq!(entry.total_url_count, 0);
        assert_eq!(entry.run_url_count, 0);
        assert_eq!(entry.cycle, 0);
    }

    #[test]
    fn test_advance_adds_to_both_counters() {
        let cases = [(0, 0, 0), (0, 0, 3), (17, 5, 1000), (9_999, 9_000, 1)];
        for (total, run, n) in cases {
            let entry = ProgressEntry {
                crawl_id: "c".to_string(),
                total_url_count: total,
                run_url_count: run,
                cycle: 4,
            };
            let next = entry.advance(n);
            assert_eq!(next.total_url_count, total + n);
            assert_eq!(next.run_url_count, run + n);
            assert_eq!(next.cycle, 5);
        }
    }

    #[test]
    fn test_start_continuation_resets_run_only() {
        let entry = ProgressEntry {
            crawl_id: "abc".to_string(),
            total_url_count: 6,
            run_url_count: 6,
            cycle: 2,
        };
        let resumed = entry.start_continuation();
        assert_eq!(resumed.run_url_count, 0);
        assert_eq!(resumed.total_url_count, 6);
        assert_eq!(resumed.cycle, 2);
    }

    #[test]
    fn test_exceeds_is_strict() {
        let mut entry = ProgressEntry::new("abc");
        entry.run_url_count = 10;
        assert!(!entry.exceeds(10));
        entry.run_url_count = 11;
        assert!(entry.exceeds(10));
    }
}

//! Environment overrides for the run budgets
//!
//! The threshold and batch size can be tuned per deployment without editing
//! the configuration file. Overrides are lenient: a value that is not a
//! positive integer is reported and ignored, never fatal.

use crate::config::types::LimitsConfig;
use crate::ConfigError;

/// Overrides `limits.run-url-threshold`
pub const RUN_URL_THRESHOLD_ENV: &str = "STATE_MACHINE_URL_THRESHOLD";

/// Overrides `limits.parallel-urls-to-sync`
pub const PARALLEL_URLS_TO_SYNC_ENV: &str = "PARALLEL_URLS_TO_SYNC";

/// Parses an override value as an integer >= 1
pub fn parse_positive_int(name: &str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value >= 1 => Ok(value),
        _ => Err(ConfigError::InvalidEnv {
            name: name.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// Applies overrides from the process environment
pub fn apply_env_overrides(limits: &mut LimitsConfig) {
    apply_env_overrides_from(limits, |name| std::env::var(name).ok());
}

/// Applies overrides using the given lookup
///
/// Split out from [`apply_env_overrides`] so callers (and tests) can supply
/// values without touching the process environment.
pub fn apply_env_overrides_from<F>(limits: &mut LimitsConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    limits.run_url_threshold = resolve(
        RUN_URL_THRESHOLD_ENV,
        lookup(RUN_URL_THRESHOLD_ENV),
        limits.run_url_threshold,
    );
    limits.parallel_urls_to_sync = resolve(
        PARALLEL_URLS_TO_SYNC_ENV,
        lookup(PARALLEL_URLS_TO_SYNC_ENV),
        limits.parallel_urls_to_sync,
    );
}

fn resolve(name: &str, raw: Option<String>, fallback: u64) -> u64 {
    let raw = match raw {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return fallback,
    };

    match parse_positive_int(name, &raw) {
        Ok(value) => {
            tracing::debug!("{} overridden from environment: {}", name, value);
            value
        }
        Err(e) => {
            tracing::warn!("{}; using {}", e, fallback);
            fallback
        }
    }
}

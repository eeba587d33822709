use crate::config::types::{Config, CrawlConfig, LimitsConfig, OutputConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawl_config(&config.crawl)?;
    validate_limits(&config.limits)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the crawl target
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    let base = Url::parse(&config.base_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid base-url '{}': {}", config.base_url, e))
    })?;

    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            base.scheme()
        )));
    }

    if base.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' has no host",
            config.base_url
        )));
    }

    for path in &config.start_paths {
        if !path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "start path '{}' must begin with '/'",
                path
            )));
        }
    }

    if config.path_keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "path-keywords cannot contain empty entries".to_string(),
        ));
    }

    Ok(())
}

/// Validates the cycle and run budgets
fn validate_limits(limits: &LimitsConfig) -> Result<(), ConfigError> {
    if limits.run_url_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "run-url-threshold must be >= 1, got {}",
            limits.run_url_threshold
        )));
    }

    if limits.parallel_urls_to_sync < 1 {
        return Err(ConfigError::Validation(format!(
            "parallel-urls-to-sync must be >= 1, got {}",
            limits.parallel_urls_to_sync
        )));
    }

    if limits.parallel_urls_to_sync >= limits.run_url_threshold {
        return Err(ConfigError::Validation(format!(
            "parallel-urls-to-sync ({}) must be less than run-url-threshold ({})",
            limits.parallel_urls_to_sync, limits.run_url_threshold
        )));
    }

    if limits.max_concurrent_workers < 1 || limits.max_concurrent_workers > 256 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-workers must be between 1 and 256, got {}",
            limits.max_concurrent_workers
        )));
    }

    if limits.cycle_retries < 1 {
        return Err(ConfigError::Validation(
            "cycle-retries must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    // Validate contact URL
    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    // Validate contact email (basic validation)
    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.staging_dir.is_empty() {
        return Err(ConfigError::Validation(
            "staging_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    // Domain part should contain at least one dot
    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(threshold: u64, batch: u64) -> LimitsConfig {
        LimitsConfig {
            run_url_threshold: threshold,
            parallel_urls_to_sync: batch,
            ..LimitsConfig::default()
        }
    }

    #[test]
    fn test_validate_limits() {
        assert!(validate_limits(&limits(10_000, 1_000)).is_ok());
        assert!(validate_limits(&limits(2, 1)).is_ok());

        assert!(validate_limits(&limits(0, 1)).is_err());
        assert!(validate_limits(&limits(10, 0)).is_err());
        assert!(validate_limits(&limits(10, 10)).is_err());
        assert!(validate_limits(&limits(10, 11)).is_err());
    }

    #[test]
    fn test_validate_crawl_config() {
        let mut crawl = CrawlConfig {
            base_url: "https://example.com/docs/".to_string(),
            start_paths: vec!["/docs/".to_string()],
            path_keywords: vec![],
        };
        assert!(validate_crawl_config(&crawl).is_ok());

        crawl.start_paths = vec!["docs".to_string()];
        assert!(validate_crawl_config(&crawl).is_err());

        crawl.start_paths.clear();
        crawl.base_url = "ftp://example.com/".to_string();
        assert!(validate_crawl_config(&crawl).is_err());

        crawl.base_url = "not a url".to_string();
        assert!(validate_crawl_config(&crawl).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }
}

use crate::config::types::{Config, FetchConfig, LimitsConfig, ServiceConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
///
/// Pure function over the parsed config; the first violation wins.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_service(&config.service)?;
    validate_fetch(&config.fetch)?;
    validate_limits(&config.limits)?;

    if config.robots.cache_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "robots cache-ttl-secs must be at least 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_service(config: &ServiceConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    if config.global_in_flight < 1 {
        return Err(ConfigError::Validation(
            "global-in-flight must be at least 1".to_string(),
        ));
    }

    if config.per_tenant_concurrency < 1 {
        return Err(ConfigError::Validation(
            "per-tenant-concurrency must be at least 1".to_string(),
        ));
    }

    if config.per_crawl_concurrency < 1 {
        return Err(ConfigError::Validation(
            "per-crawl-concurrency must be at least 1".to_string(),
        ));
    }

    if config.lease_ttl_ms < 1_000 {
        return Err(ConfigError::Validation(format!(
            "lease-ttl-ms must be at least 1000, got {}",
            config.lease_ttl_ms
        )));
    }

    if config.drain_timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "drain-timeout-secs must be at most 300, got {}",
            config.drain_timeout_secs
        )));
    }

    Ok(())
}

fn validate_fetch(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-ms must be at least 1".to_string(),
        ));
    }

    for (name, endpoint) in [
        ("headless-endpoint", &config.headless_endpoint),
        ("fire-engine-endpoint", &config.fire_engine_endpoint),
        ("extractor-endpoint", &config.extractor_endpoint),
    ] {
        if !endpoint.is_empty() && Url::parse(endpoint).is_err() {
            return Err(ConfigError::InvalidUrl(format!("{name}: {endpoint}")));
        }
    }

    if !config.fire_engine_endpoint.is_empty() && config.fire_engine_api_key.is_empty() {
        return Err(ConfigError::Validation(
            "fire-engine-endpoint requires fire-engine-api-key".to_string(),
        ));
    }

    if config.browser_pool_size < 1 {
        return Err(ConfigError::Validation(
            "browser-pool-size must be at least 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_limits(config: &LimitsConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.backoff_base_ms == 0 {
        return Err(ConfigError::Validation(
            "backoff-base-ms must be at least 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = Config::default();
        config.service.workers = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_endpoint_rejected() {
        let mut config = Config::default();
        config.fetch.headless_endpoint = "not a url".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_fire_engine_requires_key() {
        let mut config = Config::default();
        config.fetch.fire_engine_endpoint = "https://engine.example".to_string();
        assert!(validate(&config).is_err());

        config.fetch.fire_engine_api_key = "key".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_user_agent_rejected() {
        let mut config = Config::default();
        config.fetch.user_agent = "  ".to_string();
        assert!(validate(&config).is_err());
    }
}

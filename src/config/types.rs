use crate::fetch::ProxyEndpoint;
use serde::Deserialize;

/// Main configuration structure for the Dredge service
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
}

/// Worker pool and concurrency configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Number of worker tasks
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Global cap on jobs executing at once
    #[serde(rename = "global-in-flight", default = "default_global_in_flight")]
    pub global_in_flight: u32,

    /// Per-tenant cap on jobs executing at once
    #[serde(rename = "per-tenant-concurrency", default = "default_per_tenant")]
    pub per_tenant_concurrency: u32,

    /// Per-crawl cap on page jobs in flight
    #[serde(rename = "per-crawl-concurrency", default = "default_per_crawl")]
    pub per_crawl_concurrency: u32,

    /// Job lease TTL in milliseconds
    #[serde(rename = "lease-ttl-ms", default = "default_lease_ttl")]
    pub lease_ttl_ms: u64,

    /// Seconds to drain in-flight work on shutdown
    #[serde(rename = "drain-timeout-secs", default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            global_in_flight: default_global_in_flight(),
            per_tenant_concurrency: default_per_tenant(),
            per_crawl_concurrency: default_per_crawl(),
            lease_ttl_ms: default_lease_ttl(),
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

/// Fetcher configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    /// User agent sent by every strategy
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Default per-fetch budget in milliseconds
    #[serde(rename = "request-timeout-ms", default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Browser sidecar base URL; empty disables the headless tiers
    #[serde(rename = "headless-endpoint", default)]
    pub headless_endpoint: String,

    /// Number of sidecar browser instances
    #[serde(rename = "browser-pool-size", default = "default_browser_pool")]
    pub browser_pool_size: u32,

    /// External fetching service base URL; empty disables the tier
    #[serde(rename = "fire-engine-endpoint", default)]
    pub fire_engine_endpoint: String,

    #[serde(rename = "fire-engine-api-key", default)]
    pub fire_engine_api_key: String,

    /// Structured-extraction service base URL; empty disables extraction
    #[serde(rename = "extractor-endpoint", default)]
    pub extractor_endpoint: String,

    /// Residential proxies for the stealth tier
    #[serde(default)]
    pub proxies: Vec<ProxyEndpoint>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_ms: default_request_timeout(),
            headless_endpoint: String::new(),
            browser_pool_size: default_browser_pool(),
            fire_engine_endpoint: String::new(),
            fire_engine_api_key: String::new(),
            extractor_endpoint: String::new(),
            proxies: Vec::new(),
        }
    }
}

/// Retry and timeout limits
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Retry ceiling for failed jobs
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for retry backoff, in milliseconds
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Whole-crawl wall-clock bound in seconds; zero disables it
    #[serde(rename = "crawl-timeout-secs", default)]
    pub crawl_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base(),
            crawl_timeout_secs: 0,
        }
    }
}

/// Robots.txt cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RobotsConfig {
    /// Cache TTL per host, in seconds
    #[serde(rename = "cache-ttl-secs", default = "default_robots_ttl")]
    pub cache_ttl_secs: u64,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_robots_ttl(),
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// SQLite database path; empty uses an in-memory database
    #[serde(rename = "database-path", default)]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: String::new(),
        }
    }
}

/// URL canonicalization overrides
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NormalizeConfig {
    /// Hosts whose query-parameter order is part of the identifier
    #[serde(rename = "param-sensitive-hosts", default)]
    pub param_sensitive_hosts: Vec<String>,
}

fn default_workers() -> u32 {
    8
}

fn default_global_in_flight() -> u32 {
    64
}

fn default_per_tenant() -> u32 {
    10
}

fn default_per_crawl() -> u32 {
    20
}

fn default_lease_ttl() -> u64 {
    120_000
}

fn default_drain_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    "DredgeBot/0.3 (+https://github.com/dredge/dredge)".to_string()
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_browser_pool() -> u32 {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    2_000
}

fn default_robots_ttl() -> u64 {
    3_600
}

//! Robots.txt compliance
//!
//! A process-wide, read-mostly cache of parsed robots.txt files keyed by
//! host. Entries expire after a TTL (default one hour); a missing or
//! unfetchable robots.txt permits everything.

mod parser;

pub use parser::ParsedRobots;

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use url::Url;

/// Hosts retained in the cache before old entries are evicted
const MAX_CACHED_HOSTS: usize = 1_000;

/// A robots.txt entry with its fetch timestamp
#[derive(Debug, Clone)]
struct CachedRobots {
    robots: ParsedRobots,
    fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    fn is_stale(&self, ttl: Duration) -> bool {
        Utc::now() - self.fetched_at > ttl
    }
}

/// Shared robots.txt cache
///
/// Reads take the lock briefly; fetches happen outside it. Two tasks racing
/// on the same uncached host may both fetch; the second write wins, which is
/// harmless.
pub struct RobotsCache {
    client: reqwest::Client,
    user_agent: String,
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedRobots>>,
}

impl RobotsCache {
    /// Creates a cache that fetches robots.txt with the given client
    pub fn new(client: reqwest::Client, user_agent: impl Into<String>, ttl_secs: i64) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            ttl: Duration::seconds(ttl_secs),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Checks whether the configured user agent may fetch `url`
    ///
    /// Fetches and caches the host's robots.txt on a miss or a stale entry.
    pub async fn is_allowed(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_string();

        {
            let entries = self.entries.read().await;
            if let Some(cached) = entries.get(&host) {
                if !cached.is_stale(self.ttl) {
                    return cached.robots.is_allowed(url.as_str(), &self.user_agent);
                }
            }
        }

        let robots = self.fetch_robots(url).await;
        let verdict = robots.is_allowed(url.as_str(), &self.user_agent);

        let mut entries = self.entries.write().await;
        if entries.len() >= MAX_CACHED_HOSTS && !entries.contains_key(&host) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, v)| v.fetched_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            host,
            CachedRobots {
                robots,
                fetched_at: Utc::now(),
            },
        );

        verdict
    }

    /// Warms the cache for a URL's host without checking a path
    pub async fn preload(&self, url: &Url) {
        let _ = self.is_allowed(url).await;
    }

    /// Inserts robots.txt content directly, bypassing the network
    ///
    /// Test seam; also used when a fetcher already has the content in hand.
    pub async fn insert(&self, host: impl Into<String>, content: &str) {
        let mut entries = self.entries.write().await;
        entries.insert(
            host.into(),
            CachedRobots {
                robots: ParsedRobots::from_content(content),
                fetched_at: Utc::now(),
            },
        );
    }

    async fn fetch_robots(&self, url: &Url) -> ParsedRobots {
        let robots_url = format!(
            "{}://{}{}/robots.txt",
            url.scheme(),
            url.host_str().unwrap_or(""),
            url.port()
                .map(|p| format!(":{p}"))
                .unwrap_or_default()
        );

        match self.client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => ParsedRobots::from_content(&body),
                Err(e) => {
                    tracing::debug!("Failed to read robots.txt body from {}: {}", robots_url, e);
                    ParsedRobots::allow_all()
                }
            },
            Ok(response) => {
                tracing::debug!(
                    "robots.txt at {} returned {}, allowing all",
                    robots_url,
                    response.status()
                );
                ParsedRobots::allow_all()
            }
            Err(e) => {
                tracing::debug!("Failed to fetch robots.txt from {}: {}", robots_url, e);
                ParsedRobots::allow_all()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> RobotsCache {
        RobotsCache::new(reqwest::Client::new(), "DredgeBot", 3600)
    }

    #[tokio::test]
    async fn test_inserted_rules_are_used() {
        let cache = cache();
        cache
            .insert("a.test", "User-agent: *\nDisallow: /private")
            .await;

        let blocked = Url::parse("https://a.test/private/x").unwrap();
        assert!(!cache.is_allowed(&blocked).await);

        let open = Url::parse("https://a.test/public").unwrap();
        assert!(cache.is_allowed(&open).await);
    }

    #[tokio::test]
    async fn test_stale_entry_detection() {
        let entry = CachedRobots {
            robots: ParsedRobots::allow_all(),
            fetched_at: Utc::now() - Duration::hours(2),
        };
        assert!(entry.is_stale(Duration::hours(1)));
        assert!(!entry.is_stale(Duration::hours(3)));
    }
}

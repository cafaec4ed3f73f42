//! Stealth proxy fetcher
//!
//! The headless strategy routed through a leased residential proxy, with
//! fingerprint evasion enabled in the browser context. Used for sites that
//! block the plain and headless tiers.

use crate::fetch::headless::HeadlessFetcher;
use crate::fetch::proxy::ProxyPool;
use crate::fetch::{FailureKind, FetchFailure, FetchResult, Fetcher, FetcherCapability};
use crate::options::ScrapeOptions;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub struct StealthFetcher {
    sidecar: Arc<HeadlessFetcher>,
    proxies: Arc<ProxyPool>,
}

impl StealthFetcher {
    pub fn new(sidecar: Arc<HeadlessFetcher>, proxies: Arc<ProxyPool>) -> Self {
        Self { sidecar, proxies }
    }
}

#[async_trait]
impl Fetcher for StealthFetcher {
    fn name(&self) -> &'static str {
        "stealth-proxy"
    }

    fn capabilities(&self) -> FetcherCapability {
        FetcherCapability {
            executes_js: true,
            supports_screenshot: true,
            supports_proxy: true,
            supports_stealth: true,
            respects_wait_for: true,
        }
    }

    async fn fetch(
        &self,
        url: &Url,
        options: &ScrapeOptions,
        budget: Duration,
    ) -> Result<FetchResult, FetchFailure> {
        // None only when no proxies are configured; stealth fingerprinting
        // still applies in that case
        let proxy = self.proxies.lease().await;

        let (server, username, password) = match &proxy {
            Some(p) => (
                Some(p.server.clone()),
                p.username.clone(),
                p.password.clone(),
            ),
            None => (None, None, None),
        };

        let result = self
            .sidecar
            .fetch_via_sidecar(url, options, budget, server, username, password, true)
            .await;

        if let (Err(failure), Some(p)) = (&result, &proxy) {
            // A transport-level failure is charged to the proxy, not the site
            if failure.kind == FailureKind::Transient && failure.status_code.is_none() {
                self.proxies.mark_failed(&p.server).await;
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::proxy::ProxyEndpoint;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_stealth_sends_proxy_and_flag() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/html"))
            .and(body_partial_json(json!({
                "stealth": true,
                "proxy_server": "http://res1:8080"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": "<html><body>via proxy</body></html>",
                "pageStatusCode": 200,
                "pageError": null
            })))
            .mount(&server)
            .await;

        let sidecar = Arc::new(HeadlessFetcher::new(server.uri(), 1).unwrap());
        let proxies = Arc::new(ProxyPool::new(vec![ProxyEndpoint {
            server: "http://res1:8080".to_string(),
            username: None,
            password: None,
        }]));

        let fetcher = StealthFetcher::new(sidecar, proxies);
        let url = Url::parse("https://hard.test/").unwrap();
        let result = fetcher
            .fetch(&url, &ScrapeOptions::default(), Duration::from_secs(10))
            .await
            .unwrap();

        assert!(result.body.contains("via proxy"));
    }

    #[tokio::test]
    async fn test_capabilities() {
        let server_uri = "http://127.0.0.1:1";
        let fetcher = StealthFetcher::new(
            Arc::new(HeadlessFetcher::new(server_uri, 1).unwrap()),
            Arc::new(ProxyPool::new(vec![])),
        );
        let caps = fetcher.capabilities();
        assert!(caps.supports_stealth);
        assert!(caps.supports_proxy);
        assert!(caps.executes_js);
    }
}

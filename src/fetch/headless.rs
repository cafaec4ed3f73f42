//! Headless browser fetcher
//!
//! Drives the browser sidecar over HTTP: navigate, wait for load plus the
//! requested settle time, optionally capture a screenshot, and return the
//! final DOM serialization. The sidecar keeps a pool of N browser
//! instances; each fetch holds an exclusive lease on one for its duration.

use crate::fetch::{
    classify_status, looks_like_challenge, FailureKind, FetchFailure, FetchResult, Fetcher,
    FetcherCapability,
};
use crate::options::ScrapeOptions;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use url::Url;

/// Request body for the sidecar's /html endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SidecarRequest {
    pub url: String,

    /// Milliseconds to wait after the load event
    pub wait_after_load: u64,

    /// Navigation timeout in milliseconds
    pub timeout: u64,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    pub mobile: bool,

    pub screenshot: bool,

    /// Abort media and ad requests during navigation
    pub block_media: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_server: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_password: Option<String>,

    /// Apply fingerprint evasion in the browser context
    pub stealth: bool,
}

/// Response body from the sidecar's /html endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct SidecarResponse {
    pub content: String,

    #[serde(rename = "pageStatusCode")]
    pub page_status_code: u16,

    #[serde(rename = "pageError")]
    pub page_error: Option<String>,

    /// Base64-encoded PNG, present when a screenshot was requested
    pub screenshot: Option<String>,

    /// Final URL after in-page redirects, when the sidecar reports it
    #[serde(rename = "finalUrl")]
    pub final_url: Option<String>,
}

pub struct HeadlessFetcher {
    client: Client,
    endpoint: String,
    /// One permit per sidecar browser instance
    pool: Arc<Semaphore>,
}

impl HeadlessFetcher {
    pub fn new(endpoint: impl Into<String>, pool_size: usize) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(180))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            pool: Arc::new(Semaphore::new(pool_size.max(1))),
        })
    }

    /// Checks the sidecar's readiness probe
    pub async fn health(&self) -> bool {
        let url = format!("{}/health/readiness", self.endpoint);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Performs one sidecar navigation, optionally through a proxy
    ///
    /// Shared by the headless and stealth strategies; the stealth tier
    /// supplies proxy credentials and sets the stealth flag.
    pub(crate) async fn fetch_via_sidecar(
        &self,
        url: &Url,
        options: &ScrapeOptions,
        budget: Duration,
        proxy_server: Option<String>,
        proxy_username: Option<String>,
        proxy_password: Option<String>,
        stealth: bool,
    ) -> Result<FetchResult, FetchFailure> {
        let started = Instant::now();

        let permit = self
            .pool
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| FetchFailure::new(FailureKind::Fatal, url, "browser pool closed"))?;

        let budget_ms = budget.as_millis() as u64;
        let request = SidecarRequest {
            url: url.to_string(),
            wait_after_load: options.wait_for.min(budget_ms),
            timeout: budget_ms,
            headers: options.headers.clone(),
            mobile: options.mobile,
            screenshot: options.wants(crate::options::Format::Screenshot),
            block_media: options.block_ads,
            proxy_server,
            proxy_username,
            proxy_password,
            stealth,
        };

        let response = self
            .client
            .post(format!("{}/html", self.endpoint))
            .timeout(budget)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchFailure::new(FailureKind::Transient, url, "sidecar navigation timeout")
                } else {
                    FetchFailure::new(
                        FailureKind::Transient,
                        url,
                        format!("sidecar unreachable: {e}"),
                    )
                }
            })?;

        drop(permit);

        if !response.status().is_success() {
            return Err(FetchFailure::new(
                FailureKind::Transient,
                url,
                format!("sidecar returned HTTP {}", response.status().as_u16()),
            ));
        }

        let body: SidecarResponse = response.json().await.map_err(|e| {
            FetchFailure::new(
                FailureKind::Transient,
                url,
                format!("malformed sidecar response: {e}"),
            )
        })?;

        if let Some(kind) = classify_status(body.page_status_code) {
            let message = body
                .page_error
                .unwrap_or_else(|| format!("HTTP {}", body.page_status_code));
            return Err(
                FetchFailure::new(kind, url, message).with_status(body.page_status_code)
            );
        }

        if body.content.trim().is_empty() {
            return Err(FetchFailure::new(
                FailureKind::InvalidContent,
                url,
                "sidecar returned empty content",
            ));
        }

        if looks_like_challenge(&body.content) {
            return Err(FetchFailure::new(
                FailureKind::Blocked,
                url,
                "bot challenge interstitial",
            ));
        }

        let screenshot = body.screenshot.as_deref().and_then(|encoded| {
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .ok()
        });

        Ok(FetchResult {
            final_url: body.final_url.unwrap_or_else(|| url.to_string()),
            status_code: body.page_status_code,
            headers: HashMap::new(),
            body: body.content,
            screenshot,
            timing: started.elapsed(),
        })
    }
}

#[async_trait]
impl Fetcher for HeadlessFetcher {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn capabilities(&self) -> FetcherCapability {
        FetcherCapability {
            executes_js: true,
            supports_screenshot: true,
            supports_proxy: false,
            supports_stealth: false,
            respects_wait_for: true,
        }
    }

    async fn fetch(
        &self,
        url: &Url,
        options: &ScrapeOptions,
        budget: Duration,
    ) -> Result<FetchResult, FetchFailure> {
        self.fetch_via_sidecar(url, options, budget, None, None, None, false)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options() -> ScrapeOptions {
        ScrapeOptions::default()
    }

    #[tokio::test]
    async fn test_fetch_via_sidecar() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/html"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": "<html><body>Rendered</body></html>",
                "pageStatusCode": 200,
                "pageError": null
            })))
            .mount(&server)
            .await;

        let fetcher = HeadlessFetcher::new(server.uri(), 2).unwrap();
        let url = Url::parse("https://target.test/page").unwrap();
        let result = fetcher
            .fetch(&url, &options(), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(result.status_code, 200);
        assert!(result.body.contains("Rendered"));
        assert_eq!(result.final_url, url.to_string());
    }

    #[tokio::test]
    async fn test_sidecar_403_is_blocked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/html"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": "",
                "pageStatusCode": 403,
                "pageError": "Forbidden"
            })))
            .mount(&server)
            .await;

        let fetcher = HeadlessFetcher::new(server.uri(), 1).unwrap();
        let url = Url::parse("https://target.test/").unwrap();
        let failure = fetcher
            .fetch(&url, &options(), Duration::from_secs(10))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::Blocked);
        assert_eq!(failure.status_code, Some(403));
    }

    #[tokio::test]
    async fn test_sidecar_unreachable_is_transient() {
        let fetcher = HeadlessFetcher::new("http://127.0.0.1:1", 1).unwrap();
        let url = Url::parse("https://target.test/").unwrap();
        let failure = fetcher
            .fetch(&url, &options(), Duration::from_secs(2))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::Transient);
    }

    #[tokio::test]
    async fn test_screenshot_decoded() {
        let server = MockServer::start().await;
        let pixels = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3, 4]);
        Mock::given(method("POST"))
            .and(path("/html"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": "<html><body>x</body></html>",
                "pageStatusCode": 200,
                "pageError": null,
                "screenshot": pixels
            })))
            .mount(&server)
            .await;

        let fetcher = HeadlessFetcher::new(server.uri(), 1).unwrap();
        let url = Url::parse("https://target.test/").unwrap();
        let result = fetcher
            .fetch(&url, &options(), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(result.screenshot, Some(vec![1, 2, 3, 4]));
    }

    #[tokio::test]
    async fn test_health_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health/readiness"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let fetcher = HeadlessFetcher::new(server.uri(), 1).unwrap();
        assert!(fetcher.health().await);

        let down = HeadlessFetcher::new("http://127.0.0.1:1", 1).unwrap();
        assert!(!down.health().await);
    }
}

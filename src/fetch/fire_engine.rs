//! Fire-engine fetcher
//!
//! Client for the external fetching service used when every local strategy
//! is defeated. Authenticated with a bearer token; the service does its own
//! rendering and anti-bot negotiation and returns the final HTML.

use crate::fetch::{
    classify_status, FailureKind, FetchFailure, FetchResult, Fetcher, FetcherCapability,
};
use crate::options::ScrapeOptions;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use url::Url;

#[derive(Debug, Serialize)]
struct FireEngineRequest {
    url: String,
    wait: u64,
    timeout: u64,
    screenshot: bool,
    mobile: bool,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FireEngineResponse {
    html: String,
    #[serde(rename = "statusCode")]
    status_code: u16,
    #[serde(rename = "url")]
    final_url: Option<String>,
    screenshot: Option<String>,
    error: Option<String>,
}

pub struct FireEngineFetcher {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl FireEngineFetcher {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(180))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Fetcher for FireEngineFetcher {
    fn name(&self) -> &'static str {
        "fire-engine"
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
        let started = Instant::now();
        let budget_ms = budget.as_millis() as u64;

        let request = FireEngineRequest {
            url: url.to_string(),
            wait: options.wait_for.min(budget_ms),
            timeout: budget_ms,
            screenshot: options.wants(crate::options::Format::Screenshot),
            mobile: options.mobile,
            headers: options.headers.clone(),
        };

        let response = self
            .client
            .post(format!("{}/scrape", self.endpoint))
            .bearer_auth(&self.api_key)
            .timeout(budget)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchFailure::new(FailureKind::Transient, url, "fire-engine timeout")
                } else {
                    FetchFailure::new(
                        FailureKind::Transient,
                        url,
                        format!("fire-engine unreachable: {e}"),
                    )
                }
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(FetchFailure::new(
                FailureKind::Fatal,
                url,
                "fire-engine rejected credentials",
            ));
        }
        if !status.is_success() {
            return Err(FetchFailure::new(
                FailureKind::Transient,
                url,
                format!("fire-engine returned HTTP {}", status.as_u16()),
            ));
        }

        let body: FireEngineResponse = response.json().await.map_err(|e| {
            FetchFailure::new(
                FailureKind::Transient,
                url,
                format!("malformed fire-engine response: {e}"),
            )
        })?;

        if let Some(kind) = classify_status(body.status_code) {
            let message = body
                .error
                .unwrap_or_else(|| format!("HTTP {}", body.status_code));
            return Err(FetchFailure::new(kind, url, message).with_status(body.status_code));
        }

        if body.html.trim().is_empty() {
            return Err(FetchFailure::new(
                FailureKind::InvalidContent,
                url,
                "fire-engine returned empty content",
            ));
        }

        let screenshot = body.screenshot.as_deref().and_then(|encoded| {
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .ok()
        });

        Ok(FetchResult {
            final_url: body.final_url.unwrap_or_else(|| url.to_string()),
            status_code: body.status_code,
            headers: HashMap::new(),
            body: body.html,
            screenshot,
            timing: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scrape"))
            .and(header("authorization", "Bearer fe-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "html": "<html><body>Engine output</body></html>",
                "statusCode": 200
            })))
            .mount(&server)
            .await;

        let fetcher = FireEngineFetcher::new(server.uri(), "fe-key").unwrap();
        let url = Url::parse("https://fortress.test/").unwrap();
        let result = fetcher
            .fetch(&url, &ScrapeOptions::default(), Duration::from_secs(10))
            .await
            .unwrap();

        assert!(result.body.contains("Engine output"));
    }

    #[tokio::test]
    async fn test_bad_credentials_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scrape"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let fetcher = FireEngineFetcher::new(server.uri(), "wrong").unwrap();
        let url = Url::parse("https://fortress.test/").unwrap();
        let failure = fetcher
            .fetch(&url, &ScrapeOptions::default(), Duration::from_secs(10))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::Fatal);
    }

    #[tokio::test]
    async fn test_upstream_status_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scrape"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "html": "",
                "statusCode": 404
            })))
            .mount(&server)
            .await;

        let fetcher = FireEngineFetcher::new(server.uri(), "fe-key").unwrap();
        let url = Url::parse("https://fortress.test/gone").unwrap();
        let failure = fetcher
            .fetch(&url, &ScrapeOptions::default(), Duration::from_secs(10))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::NotFound);
    }
}

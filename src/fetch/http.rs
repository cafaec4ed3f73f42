//! Plain HTTP fetcher
//!
//! Single GET with manual redirect following (up to 10 hops, loop
//! detection), no JS execution. The fast, cheap first rung of the strategy
//! ladder.

use crate::fetch::{
    classify_status, is_html_content_type, looks_like_challenge, FailureKind, FetchFailure,
    FetchResult, Fetcher, FetcherCapability,
};
use crate::options::ScrapeOptions;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use url::Url;

const MAX_REDIRECTS: usize = 10;

pub struct PlainHttpFetcher {
    client: Client,
    insecure_client: Client,
}

impl PlainHttpFetcher {
    /// Builds the fetcher with a shared client pair
    ///
    /// Redirects are handled manually so that loops and terminal hops can be
    /// classified; the second client skips TLS verification for requests
    /// that ask for it.
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let base = || {
            Client::builder()
                .user_agent(user_agent.to_string())
                .connect_timeout(Duration::from_secs(10))
                .redirect(Policy::none())
                .gzip(true)
                .brotli(true)
        };

        Ok(Self {
            client: base().build()?,
            insecure_client: base().danger_accept_invalid_certs(true).build()?,
        })
    }

    fn classify_reqwest_error(url: &Url, e: &reqwest::Error) -> FetchFailure {
        if e.is_timeout() {
            return FetchFailure::new(FailureKind::Transient, url, "request timeout");
        }

        let message = e.to_string();
        let lower = message.to_lowercase();
        if lower.contains("dns") || lower.contains("certificate") || lower.contains("tls") {
            return FetchFailure::new(FailureKind::Fatal, url, message);
        }
        if e.is_connect() {
            return FetchFailure::new(FailureKind::Transient, url, message);
        }
        if e.is_builder() || e.is_request() {
            return FetchFailure::new(FailureKind::Fatal, url, message);
        }

        FetchFailure::new(FailureKind::Transient, url, message)
    }
}

#[async_trait]
impl Fetcher for PlainHttpFetcher {
    fn name(&self) -> &'static str {
        "plain-http"
    }

    fn capabilities(&self) -> FetcherCapability {
        FetcherCapability::default()
    }

    async fn fetch(
        &self,
        url: &Url,
        options: &ScrapeOptions,
        budget: Duration,
    ) -> Result<FetchResult, FetchFailure> {
        let client = if options.skip_tls_verification {
            &self.insecure_client
        } else {
            &self.client
        };

        let started = Instant::now();
        let mut current = url.clone();
        let mut visited: HashSet<String> = HashSet::new();

        loop {
            if !visited.insert(current.to_string()) {
                return Err(FetchFailure::new(
                    FailureKind::Fatal,
                    url,
                    format!("redirect loop at {current}"),
                ));
            }
            if visited.len() > MAX_REDIRECTS {
                return Err(FetchFailure::new(
                    FailureKind::Fatal,
                    url,
                    format!("more than {MAX_REDIRECTS} redirects"),
                ));
            }

            let remaining = budget.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(FetchFailure::new(
                    FailureKind::Transient,
                    url,
                    "fetch budget exhausted",
                ));
            }

            let mut request = client.get(current.clone()).timeout(remaining);
            for (name, value) in &options.headers {
                request = request.header(name.as_str(), value.as_str());
            }

            let response = request
                .send()
                .await
                .map_err(|e| Self::classify_reqwest_error(url, &e))?;

            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        FetchFailure::new(
                            FailureKind::Fatal,
                            url,
                            "redirect without Location header",
                        )
                    })?;

                current = current.join(location).map_err(|e| {
                    FetchFailure::new(
                        FailureKind::Fatal,
                        url,
                        format!("invalid redirect target {location}: {e}"),
                    )
                })?;
                tracing::debug!("Following redirect to {}", current);
                continue;
            }

            if let Some(kind) = classify_status(status.as_u16()) {
                return Err(FetchFailure::new(
                    kind,
                    url,
                    format!("HTTP {}", status.as_u16()),
                )
                .with_status(status.as_u16()));
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            if !is_html_content_type(&content_type) {
                return Err(FetchFailure::new(
                    FailureKind::InvalidContent,
                    url,
                    format!("non-HTML content type: {content_type}"),
                )
                .with_status(status.as_u16()));
            }

            let headers: HashMap<String, String> = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_lowercase(), v.to_string()))
                })
                .collect();

            let final_url = current.to_string();
            let status_code = status.as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| Self::classify_reqwest_error(url, &e))?;

            if body.trim().is_empty() {
                return Err(
                    FetchFailure::new(FailureKind::InvalidContent, url, "empty body")
                        .with_status(status_code),
                );
            }

            if looks_like_challenge(&body) {
                return Err(FetchFailure::new(
                    FailureKind::Blocked,
                    url,
                    "bot challenge interstitial",
                )
                .with_status(status_code));
            }

            return Ok(FetchResult {
                final_url,
                status_code,
                headers,
                body,
                screenshot: None,
                timing: started.elapsed(),
            });
        }
    }
}

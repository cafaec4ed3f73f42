//! Fetcher selection and ordered fallback
//!
//! Given scrape options, the selector builds the ordered strategy list,
//! invokes each within the remaining wall-clock budget, and classifies the
//! outcome. Recoverable failures (Transient, Blocked) advance to the next
//! capable strategy; NotFound and Fatal stop immediately.

use crate::fetch::{FailureKind, FetchFailure, FetchResult, Fetcher, FetcherCapability};
use crate::options::{Format, ProxyTier, ScrapeOptions};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// One entry in the attempt trail
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    pub strategy: &'static str,
    pub failure: FailureKind,
}

/// The result of running the fallback ladder for one URL
#[derive(Debug)]
pub struct FetchOutcome {
    pub result: Result<FetchResult, FetchFailure>,

    /// Failed attempts, in the order they were made; empty on first-try
    /// success
    pub attempts: Vec<FetchAttempt>,

    /// Name of the strategy that produced the result
    pub strategy: Option<&'static str>,
}

/// Orders strategies and runs the fallback ladder
pub struct FetcherSelector {
    /// Cheapest-first strategy ladder
    strategies: Vec<Arc<dyn Fetcher>>,
}

impl FetcherSelector {
    pub fn new(strategies: Vec<Arc<dyn Fetcher>>) -> Self {
        Self { strategies }
    }

    /// Fetches a URL with ordered fallback within `options.timeout`
    ///
    /// The first selected strategy is always attempted, even if its budget
    /// is already exhausted by selection; later fallbacks are skipped once
    /// no budget remains.
    pub async fn fetch(&self, url: &Url, options: &ScrapeOptions) -> FetchOutcome {
        let plan = self.plan(options);
        if plan.is_empty() {
            return FetchOutcome {
                result: Err(FetchFailure::new(
                    FailureKind::Fatal,
                    url,
                    "no fetch strategy supports the requested options",
                )),
                attempts: Vec::new(),
                strategy: None,
            };
        }

        let budget = Duration::from_millis(options.timeout);
        let started = Instant::now();
        let mut attempts = Vec::new();
        let mut last_failure: Option<FetchFailure> = None;

        for (index, strategy) in plan.iter().enumerate() {
            let remaining = budget.saturating_sub(started.elapsed());
            if index > 0 && remaining.is_zero() {
                tracing::debug!(
                    "Budget exhausted before {} for {}, stopping fallback",
                    strategy.name(),
                    url
                );
                break;
            }

            // The first strategy always runs; give it at least a nominal slice
            let slice = if remaining.is_zero() { budget } else { remaining };

            tracing::debug!("Trying {} for {} ({:?} left)", strategy.name(), url, slice);

            match strategy.fetch(url, options, slice).await {
                Ok(result) => {
                    return FetchOutcome {
                        result: Ok(result),
                        attempts,
                        strategy: Some(strategy.name()),
                    };
                }
                Err(failure) => {
                    // A challenge page dressed as content is a block
                    let recorded = if failure.kind == FailureKind::InvalidContent {
                        FailureKind::Blocked
                    } else {
                        failure.kind
                    };
                    attempts.push(FetchAttempt {
                        strategy: strategy.name(),
                        failure: recorded,
                    });

                    match recorded {
                        FailureKind::Transient | FailureKind::Blocked => {
                            last_failure = Some(failure);
                        }
                        FailureKind::NotFound | FailureKind::Fatal => {
                            return FetchOutcome {
                                result: Err(failure),
                                attempts,
                                strategy: Some(strategy.name()),
                            };
                        }
                        FailureKind::InvalidContent => unreachable!(),
                    }
                }
            }
        }

        let strategy = attempts.last().map(|a| a.strategy);
        FetchOutcome {
            result: Err(last_failure.unwrap_or_else(|| {
                FetchFailure::new(FailureKind::Transient, url, "fetch budget exhausted")
            })),
            attempts,
            strategy,
        }
    }

    /// Builds the ordered list of strategies capable of serving `options`
    ///
    /// With no special needs the full ladder applies, cheapest first. A
    /// need for screenshots, waitFor, or a proxy tier drops the strategies
    /// that cannot satisfy it.
    fn plan(&self, options: &ScrapeOptions) -> Vec<Arc<dyn Fetcher>> {
        self.strategies
            .iter()
            .filter(|s| satisfies(s.capabilities(), options))
            .cloned()
            .collect()
    }
}

fn satisfies(caps: FetcherCapability, options: &ScrapeOptions) -> bool {
    if options.wants(Format::Screenshot) && !caps.supports_screenshot {
        return false;
    }
    if options.wait_for > 0 && !caps.respects_wait_for {
        return false;
    }
    match options.proxy {
        ProxyTier::None => {}
        ProxyTier::Basic => {
            if !caps.supports_proxy {
                return false;
            }
        }
        ProxyTier::Stealth => {
            if !caps.supports_stealth {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted fetcher: fails `failures` times with `kind`, then succeeds
    struct ScriptedFetcher {
        name: &'static str,
        caps: FetcherCapability,
        kind: Option<FailureKind>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn ok(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                caps: FetcherCapability::default(),
                kind: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str, kind: FailureKind) -> Arc<Self> {
            Arc::new(Self {
                name,
                caps: FetcherCapability::default(),
                kind: Some(kind),
                calls: AtomicUsize::new(0),
            })
        }

        fn with_caps(self: Arc<Self>, caps: FetcherCapability) -> Arc<Self> {
            Arc::new(Self {
                name: self.name,
                caps,
                kind: self.kind,
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        fn name(&self) -> &'static str {
            self.name
        }

        fn capabilities(&self) -> FetcherCapability {
            self.caps
        }

        async fn fetch(
            &self,
            url: &Url,
            _options: &ScrapeOptions,
            _budget: Duration,
        ) -> Result<FetchResult, FetchFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.kind {
                Some(kind) => Err(FetchFailure::new(kind, url, "scripted failure")),
                None => Ok(FetchResult {
                    final_url: url.to_string(),
                    status_code: 200,
                    headers: HashMap::new(),
                    body: format!("<html><body>{}</body></html>", self.name),
                    screenshot: None,
                    timing: Duration::from_millis(1),
                }),
            }
        }
    }

    fn url() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let first = ScriptedFetcher::ok("first");
        let second = ScriptedFetcher::ok("second");
        let selector = FetcherSelector::new(vec![first.clone(), second.clone()]);

        let outcome = selector.fetch(&url(), &ScrapeOptions::default()).await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.strategy, Some("first"));
        assert!(outcome.attempts.is_empty());
        assert_eq!(second.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fallback_on_blocked() {
        let blocked = ScriptedFetcher::failing("blocked", FailureKind::Blocked);
        let rescue = ScriptedFetcher::ok("rescue");
        let selector = FetcherSelector::new(vec![blocked.clone(), rescue]);

        let outcome = selector.fetch(&url(), &ScrapeOptions::default()).await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.strategy, Some("rescue"));
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.attempts[0].failure, FailureKind::Blocked);
    }

    #[tokio::test]
    async fn test_fallback_monotonicity() {
        // If strategy k reports Blocked, every earlier strategy was tried
        // and failed with Transient or Blocked
        let a = ScriptedFetcher::failing("a", FailureKind::Transient);
        let b = ScriptedFetcher::failing("b", FailureKind::Blocked);
        let c = ScriptedFetcher::failing("c", FailureKind::Blocked);
        let selector = FetcherSelector::new(vec![a.clone(), b.clone(), c.clone()]);

        let outcome = selector.fetch(&url(), &ScrapeOptions::default()).await;

        assert!(outcome.result.is_err());
        let trail: Vec<_> = outcome.attempts.iter().map(|x| x.strategy).collect();
        assert_eq!(trail, vec!["a", "b", "c"]);
        for attempt in &outcome.attempts[..outcome.attempts.len() - 1] {
            assert!(matches!(
                attempt.failure,
                FailureKind::Transient | FailureKind::Blocked
            ));
        }
    }

    #[tokio::test]
    async fn test_not_found_stops_immediately() {
        let gone = ScriptedFetcher::failing("gone", FailureKind::NotFound);
        let unused = ScriptedFetcher::ok("unused");
        let selector = FetcherSelector::new(vec![gone, unused.clone()]);

        let outcome = selector.fetch(&url(), &ScrapeOptions::default()).await;

        assert_eq!(outcome.result.unwrap_err().kind, FailureKind::NotFound);
        assert_eq!(unused.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_content_treated_as_blocked() {
        let challenge = ScriptedFetcher::failing("challenge", FailureKind::InvalidContent);
        let rescue = ScriptedFetcher::ok("rescue");
        let selector = FetcherSelector::new(vec![challenge, rescue]);

        let outcome = selector.fetch(&url(), &ScrapeOptions::default()).await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.attempts[0].failure, FailureKind::Blocked);
    }

    #[tokio::test]
    async fn test_capability_needs_skip_incapable_strategies() {
        let plain = ScriptedFetcher::ok("plain");
        let browser = ScriptedFetcher::ok("browser").with_caps(FetcherCapability {
            executes_js: true,
            supports_screenshot: true,
            respects_wait_for: true,
            ..Default::default()
        });
        let selector = FetcherSelector::new(vec![plain.clone(), browser]);

        let options = ScrapeOptions {
            wait_for: 500,
            ..Default::default()
        };
        let outcome = selector.fetch(&url(), &options).await;

        assert_eq!(outcome.strategy, Some("browser"));
        assert_eq!(plain.call_count(), 0);
    }

    #[tokio::test]
    async fn test_no_capable_strategy_is_fatal() {
        let plain = ScriptedFetcher::ok("plain");
        let selector = FetcherSelector::new(vec![plain]);

        let options = ScrapeOptions {
            formats: vec![Format::Markdown, Format::Screenshot],
            ..Default::default()
        };
        let outcome = selector.fetch(&url(), &options).await;

        assert_eq!(outcome.result.unwrap_err().kind, FailureKind::Fatal);
    }
}

//! Residential proxy pool
//!
//! Proxies are leased per fetch. Selection rotates through endpoints not
//! currently marked failing; a failed endpoint is retried once every
//! endpoint has failed (better a suspect proxy than none).

use rand::Rng;
use serde::Deserialize;
use std::collections::HashSet;
use tokio::sync::Mutex;

/// One proxy endpoint from configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct ProxyEndpoint {
    /// Scheme, host and port, e.g. `http://10.0.0.1:8080`
    pub server: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Default)]
struct PoolState {
    next: usize,
    failing: HashSet<String>,
}

/// Shared pool of residential proxies
pub struct ProxyPool {
    endpoints: Vec<ProxyEndpoint>,
    state: Mutex<PoolState>,
}

impl ProxyPool {
    pub fn new(endpoints: Vec<ProxyEndpoint>) -> Self {
        Self {
            endpoints,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Leases a proxy for one fetch
    ///
    /// Rotates past endpoints marked failing; when all endpoints are
    /// failing, picks one at random and clears the failure marks.
    pub async fn lease(&self) -> Option<ProxyEndpoint> {
        if self.endpoints.is_empty() {
            return None;
        }

        let mut state = self.state.lock().await;

        for _ in 0..self.endpoints.len() {
            let candidate = &self.endpoints[state.next % self.endpoints.len()];
            state.next = state.next.wrapping_add(1);
            if !state.failing.contains(&candidate.server) {
                return Some(candidate.clone());
            }
        }

        // Every endpoint is failing; reset and pick one at random
        state.failing.clear();
        let index = rand::thread_rng().gen_range(0..self.endpoints.len());
        Some(self.endpoints[index].clone())
    }

    /// Marks an endpoint as failing so rotation skips it
    pub async fn mark_failed(&self, server: &str) {
        let mut state = self.state.lock().await;
        state.failing.insert(server.to_string());
        tracing::debug!("Proxy {} marked failing", server);
    }
}

use crate::error::{Error, Result};
use crate::proxy::scorer::ProxyScorer;
use parking_lot::Mutex;
use std::collections::HashMap;

/// How many of the best-ranked proxies a rotation draws from.
pub const ROTATION_POOL_SIZE: usize = 20;
/// Latency recorded against a proxy on every failure.
pub const FAILURE_LATENCY: f64 = 100.0;

struct State {
    scorer: ProxyScorer,
    sticky: HashMap<String, String>,
}

/// Hands out proxies per target domain.
///
/// A domain keeps its proxy until [`ProxyManager::rotate`] is called or a
/// caller asks for a rotating pick. Scores come from the shared [`ProxyScorer`].
pub struct ProxyManager {
    proxies: Vec<String>,
    state: Mutex<State>,
}

impl ProxyManager {
    pub fn new(proxies: Vec<String>, scorer: ProxyScorer) -> Self {
        Self {
            proxies,
            state: Mutex::new(State {
                scorer,
                sticky: HashMap::new(),
            }),
        }
    }

    pub fn get_proxy(&self, domain: &str, rotate: bool) -> Result<String> {
        let mut state = self.state.lock();

        if !rotate {
            if let Some(proxy) = state.sticky.get(domain) {
                return Ok(proxy.clone());
            }
        }

        let ranked = state.scorer.rank(&self.proxies);
        if ranked.is_empty() {
            return Err(Error::NoProxiesAvailable);
        }

        let (chosen, _) = if rotate {
            let top = &ranked[..ranked.len().min(ROTATION_POOL_SIZE)];
            top[rand::random_range(0..top.len())]
        } else {
            ranked[0]
        };
        let chosen = chosen.to_string();

        log::debug!(
            "Assigned proxy {} to {} (rotate={}, score={:.1})",
            chosen,
            domain,
            rotate,
            state.scorer.score(&chosen)
        );
        state.sticky.insert(domain.to_string(), chosen.clone());
        Ok(chosen)
    }

    /// Drops the sticky assignment for `domain`. Scores are untouched.
    pub fn rotate(&self, domain: &str) {
        if let Some(previous) = self.state.lock().sticky.remove(domain) {
            log::debug!("Released proxy {} from {}", previous, domain);
        }
    }

    pub fn report_success(&self, proxy: &str, latency: f64) {
        self.state.lock().scorer.record(proxy, true, latency, false);
    }

    pub fn report_failure(&self, proxy: &str) {
        // every failure counts as a block for scoring purposes
        self.state
            .lock()
            .scorer
            .record(proxy, false, FAILURE_LATENCY, true);
    }

    pub fn sticky_proxy(&self, domain: &str) -> Option<String> {
        self.state.lock().sticky.get(domain).cloned()
    }

    pub fn score(&self, proxy: &str) -> f64 {
        self.state.lock().scorer.score(proxy)
    }

    /// Current pool with scores, best first.
    pub fn ranked(&self) -> Vec<(String, f64)> {
        let state = self.state.lock();
        state
            .scorer
            .rank(&self.proxies)
            .into_iter()
            .map(|(p, s)| (p.to_string(), s))
            .collect()
    }

    pub fn proxies(&self) -> &[String] {
        &self.proxies
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

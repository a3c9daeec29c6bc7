//! Provider registry and per-provider circuit breaker.
//!
//! The registry is built once at startup and is read-only afterwards. Its
//! order is the priority order used to pick the primary reply.
//!
//! The circuit breaker is opt-in. When enabled, a provider whose circuit is
//! open is skipped for a cooldown period. If every circuit is open the
//! registry dispatches to all providers rather than none.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{CircuitBreakerConfig, ProviderEntryConfig};

use super::{ChatCompletionsProvider, ProviderResult, SharedProvider};

/// Circuit state for a single provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Healthy, requests allowed
    Closed,
    /// Tripped, requests skipped until the cooldown expires
    Open,
    /// Cooldown expired, the next request probes recovery
    HalfOpen,
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Consecutive-failure tracker keyed by provider id
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    consecutive_failures: HashMap<String, u32>,
    last_failure_secs: HashMap<String, u64>,
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            consecutive_failures: HashMap::new(),
            last_failure_secs: HashMap::new(),
            failure_threshold,
            cooldown_secs,
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(config.failure_threshold, config.cooldown_secs)
    }

    pub fn record_success(&mut self, provider_id: &str) {
        self.consecutive_failures.remove(provider_id);
        self.last_failure_secs.remove(provider_id);
    }

    pub fn record_failure(&mut self, provider_id: &str) {
        let count = self
            .consecutive_failures
            .entry(provider_id.to_string())
            .or_insert(0);
        *count += 1;
        self.last_failure_secs
            .insert(provider_id.to_string(), unix_now());
    }

    pub fn state(&self, provider_id: &str) -> CircuitState {
        let failures = self.failure_count(provider_id);
        if failures < self.failure_threshold {
            return CircuitState::Closed;
        }
        let last = self
            .last_failure_secs
            .get(provider_id)
            .copied()
            .unwrap_or(0);
        if unix_now().saturating_sub(last) >= self.cooldown_secs {
            CircuitState::HalfOpen
        } else {
            CircuitState::Open
        }
    }

    pub fn is_available(&self, provider_id: &str) -> bool {
        !matches!(self.state(provider_id), CircuitState::Open)
    }

    pub fn failure_count(&self, provider_id: &str) -> u32 {
        self.consecutive_failures
            .get(provider_id)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::from_config(&CircuitBreakerConfig::default())
    }
}

/// Ordered, read-only set of providers
pub struct ProviderRegistry {
    providers: Vec<SharedProvider>,
    breaker: Option<Mutex<CircuitBreaker>>,
}

impl ProviderRegistry {
    /// Registry over `providers`, in priority order, with no circuit breaker
    pub fn new(providers: Vec<SharedProvider>) -> Self {
        Self {
            providers,
            breaker: None,
        }
    }

    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(Mutex::new(breaker));
        self
    }

    /// Build chat-completions providers from config entries.
    ///
    /// Entries whose API key is missing are skipped with a warning so that a
    /// partially configured deployment still serves what it can.
    pub fn from_config(
        entries: &[ProviderEntryConfig],
        breaker: &CircuitBreakerConfig,
        deadline: Duration,
    ) -> ProviderResult<Self> {
        let mut providers: Vec<SharedProvider> = Vec::with_capacity(entries.len());
        for entry in entries {
            match ChatCompletionsProvider::from_config(entry, deadline) {
                Ok(provider) => {
                    info!(provider = %entry.id, endpoint = %provider.endpoint(), "Registered provider");
                    providers.push(Arc::new(provider));
                }
                Err(super::ProviderError::MissingApiKey(var)) => {
                    warn!(provider = %entry.id, env = %var, "Skipping provider without API key");
                }
                Err(e) => return Err(e),
            }
        }

        let registry = Self::new(providers);
        Ok(if breaker.enabled {
            registry.with_circuit_breaker(CircuitBreaker::from_config(breaker))
        } else {
            registry
        })
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// All providers in priority order
    pub fn providers(&self) -> &[SharedProvider] {
        &self.providers
    }

    pub fn ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_string()).collect()
    }

    /// Providers to dispatch to, in priority order.
    pub fn select(&self) -> Vec<SharedProvider> {
        let Some(breaker) = self.breaker() else {
            return self.providers.clone();
        };

        let available: Vec<SharedProvider> = self
            .providers
            .iter()
            .filter(|p| breaker.is_available(p.id()))
            .cloned()
            .collect();

        if available.is_empty() && !self.providers.is_empty() {
            warn!("Every provider circuit is open, dispatching to all");
            return self.providers.clone();
        }
        available
    }

    pub fn record_success(&self, provider_id: &str) {
        if let Some(mut breaker) = self.breaker() {
            breaker.record_success(provider_id);
        }
    }

    pub fn record_failure(&self, provider_id: &str) {
        if let Some(mut breaker) = self.breaker() {
            breaker.record_failure(provider_id);
            if breaker.state(provider_id) == CircuitState::Open {
                warn!(provider = %provider_id, failures = breaker.failure_count(provider_id), "Provider circuit opened");
            }
        }
    }

    /// Circuit state, or `Closed` when the breaker is disabled
    pub fn circuit_state(&self, provider_id: &str) -> CircuitState {
        self.breaker()
            .map(|b| b.state(provider_id))
            .unwrap_or(CircuitState::Closed)
    }

    fn breaker(&self) -> Option<MutexGuard<'_, CircuitBreaker>> {
        self.breaker
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .field("circuit_breaker", &self.breaker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderClient, ProviderContext, ProviderReply};
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl ProviderClient for Named {
        fn id(&self) -> &str {
            self.0
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        async fn generate(
            &self,
            _prompt: &str,
            _context: &ProviderContext,
        ) -> ProviderResult<ProviderReply> {
            Ok(ProviderReply {
                provider_id: self.0.to_string(),
                text: "ok".to_string(),
            })
        }
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(vec![
            Arc::new(Named("a")),
            Arc::new(Named("b")),
            Arc::new(Named("c")),
        ])
    }

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.state("a"), CircuitState::Closed);
        assert!(cb.is_available("a"));
    }

    #[test]
    fn test_circuit_opens_after_threshold_and_resets() {
        let mut cb = CircuitBreaker::new(2, 9999);
        cb.record_failure("a");
        assert_eq!(cb.state("a"), CircuitState::Closed);
        cb.record_failure("a");
        assert_eq!(cb.state("a"), CircuitState::Open);
        cb.record_success("a");
        assert_eq!(cb.state("a"), CircuitState::Closed);
        assert_eq!(cb.failure_count("a"), 0);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let mut cb = CircuitBreaker::new(1, 0);
        cb.record_failure("a");
        assert_eq!(cb.state("a"), CircuitState::HalfOpen);
        assert!(cb.is_available("a"));
    }

    #[test]
    fn test_select_keeps_priority_order() {
        assert_eq!(registry().ids(), vec!["a", "b", "c"]);
        let ids: Vec<_> = registry()
            .select()
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_disabled_breaker_ignores_failures() {
        let registry = registry();
        for _ in 0..10 {
            registry.record_failure("a");
        }
        assert_eq!(registry.circuit_state("a"), CircuitState::Closed);
        assert_eq!(registry.select().len(), 3);
    }

    #[test]
    fn test_select_skips_open_circuit() {
        let registry = registry().with_circuit_breaker(CircuitBreaker::new(1, 9999));
        registry.record_failure("b");
        let ids: Vec<_> = registry
            .select()
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_all_open_dispatches_to_all() {
        let registry = registry().with_circuit_breaker(CircuitBreaker::new(1, 9999));
        for id in ["a", "b", "c"] {
            registry.record_failure(id);
        }
        assert_eq!(registry.select().len(), 3);
    }

    #[test]
    fn test_from_config_skips_missing_keys() {
        let entries = vec![
            ProviderEntryConfig {
                id: "keyed".to_string(),
                base_url: "http://localhost:1/v1".to_string(),
                model: "m".to_string(),
                api_key_env: Some("CARE_REGISTRY_TEST_KEY_NEVER_SET".to_string()),
                timeout_secs: 5,
                temperature: 0.3,
            },
            ProviderEntryConfig {
                id: "open".to_string(),
                base_url: "http://localhost:1/v1".to_string(),
                model: "m".to_string(),
                api_key_env: None,
                timeout_secs: 5,
                temperature: 0.3,
            },
        ];
        let registry = ProviderRegistry::from_config(
            &entries,
            &CircuitBreakerConfig::default(),
            Duration::from_secs(12),
        )
        .unwrap();
        assert_eq!(registry.ids(), vec!["open"]);
    }
}

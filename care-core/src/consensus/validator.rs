//! Multi-provider consensus validator
//!
//! Fans the same prompt out to every selected provider, joins on all of them
//! within a shared deadline and picks the primary reply by registry priority.
//!
//! ```text
//! registry.select() ──► [p1, p2, p3]
//!                         │   │   │    each bounded by min(own timeout, deadline)
//!                         ▼   ▼   ▼
//!                      join_all (ordered) ◄── cancel token
//!                         │
//!        first success ──►┴──► primary, remaining successes ──► alternates
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConsensusConfig;
use crate::provider::{
    ProviderContext, ProviderError, ProviderRegistry, ProviderReply, ProviderResult,
    SharedProvider,
};
use crate::safety::{screen_reply, ReplyFlag};

use super::agreement;

/// One non-primary successful completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alternate {
    pub provider_id: String,
    pub text: String,
}

/// A provider that contributed nothing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider_id: String,
    pub reason: String,
}

/// Outcome of one consensus round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub primary_text: String,
    pub primary_provider_id: String,
    pub alternates: Vec<Alternate>,
    /// Advisory only; disagreement never rejects the primary reply
    pub all_agree: bool,
    pub agreement_score: f32,
    pub evaluation_note: String,
    pub failures: Vec<ProviderFailure>,
    pub safety_flags: Vec<ReplyFlag>,
    /// Wall time per dispatched provider, in milliseconds
    pub latency_ms: BTreeMap<String, u64>,
}

/// Errors that end a consensus round
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("No provider available ({attempted} attempted, {} failed)", .failures.len())]
    NoProviderAvailable {
        attempted: usize,
        failures: Vec<ProviderFailure>,
    },

    #[error("Consensus round cancelled")]
    Cancelled,
}

/// Result type for consensus rounds
pub type ValidationResult<T> = Result<T, ConsensusError>;

struct Attempt {
    provider_id: String,
    result: ProviderResult<ProviderReply>,
    latency: Duration,
}

/// Concurrent fan-out and primary selection
#[derive(Debug, Clone, Default)]
pub struct ConsensusValidator {
    config: ConsensusConfig,
}

impl ConsensusValidator {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn deadline(&self) -> Duration {
        self.config.deadline()
    }

    /// Run one consensus round.
    ///
    /// Provider failures are absorbed here; the only errors are total
    /// exhaustion and cancellation.
    pub async fn validate(
        &self,
        prompt: &str,
        context: &ProviderContext,
        registry: &ProviderRegistry,
        cancel: &CancellationToken,
    ) -> ValidationResult<ConsensusResult> {
        if cancel.is_cancelled() {
            return Err(ConsensusError::Cancelled);
        }

        let providers = registry.select();
        if providers.is_empty() {
            warn!("No providers registered");
            return Err(ConsensusError::NoProviderAvailable {
                attempted: 0,
                failures: Vec::new(),
            });
        }

        let deadline = self.deadline();
        debug!(
            providers = providers.len(),
            deadline_ms = deadline.as_millis() as u64,
            "Dispatching consensus round"
        );

        let calls = providers
            .iter()
            .map(|provider| call_provider(provider, prompt, context, deadline));

        // Dropping the joined future drops every in-flight provider call.
        let attempts = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Consensus round cancelled by caller");
                return Err(ConsensusError::Cancelled);
            }
            attempts = join_all(calls) => attempts,
        };

        self.settle(attempts, registry)
    }

    fn settle(
        &self,
        attempts: Vec<Attempt>,
        registry: &ProviderRegistry,
    ) -> ValidationResult<ConsensusResult> {
        let attempted = attempts.len();
        let mut successes: Vec<Alternate> = Vec::new();
        let mut failures = Vec::new();
        let mut latency_ms = BTreeMap::new();

        for attempt in attempts {
            latency_ms.insert(attempt.provider_id.clone(), attempt.latency.as_millis() as u64);
            match attempt.result {
                Ok(reply) => {
                    registry.record_success(&attempt.provider_id);
                    successes.push(Alternate {
                        provider_id: attempt.provider_id,
                        text: reply.text,
                    });
                }
                Err(e) => {
                    warn!(provider = %attempt.provider_id, error = %e, "Provider failed");
                    registry.record_failure(&attempt.provider_id);
                    failures.push(ProviderFailure {
                        provider_id: attempt.provider_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if successes.is_empty() {
            return Err(ConsensusError::NoProviderAvailable {
                attempted,
                failures,
            });
        }

        let primary = successes.remove(0);
        let alternates = successes;

        let alternate_texts: Vec<&str> = alternates.iter().map(|a| a.text.as_str()).collect();
        let report = agreement::measure(
            &primary.text,
            &alternate_texts,
            self.config.min_keyword_len,
            self.config.agreement_threshold,
        );

        let safety_flags: Vec<ReplyFlag> = std::iter::once(&primary)
            .chain(alternates.iter())
            .flat_map(|reply| screen_reply(&reply.provider_id, &reply.text))
            .collect();

        let evaluation_note = evaluation_note(
            attempted,
            alternates.len() + 1,
            report.all_agree,
            report.score,
            &safety_flags,
        );

        info!(
            primary = %primary.provider_id,
            responded = alternates.len() + 1,
            attempted,
            all_agree = report.all_agree,
            agreement = report.score,
            "Consensus reached"
        );

        Ok(ConsensusResult {
            primary_text: primary.text,
            primary_provider_id: primary.provider_id,
            alternates,
            all_agree: report.all_agree,
            agreement_score: report.score,
            evaluation_note,
            failures,
            safety_flags,
            latency_ms,
        })
    }
}

async fn call_provider(
    provider: &SharedProvider,
    prompt: &str,
    context: &ProviderContext,
    deadline: Duration,
) -> Attempt {
    let limit = provider.timeout().min(deadline);
    let started = Instant::now();

    let result = match timeout(limit, provider.generate(prompt, context)).await {
        Ok(Ok(reply)) if reply.text.trim().is_empty() => Err(ProviderError::EmptyResponse),
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(limit)),
    };

    Attempt {
        provider_id: provider.id().to_string(),
        result,
        latency: started.elapsed(),
    }
}

fn evaluation_note(
    attempted: usize,
    responded: usize,
    all_agree: bool,
    score: f32,
    flags: &[ReplyFlag],
) -> String {
    let mut note = format!("{}/{} providers responded", responded, attempted);
    if responded > 1 {
        if all_agree {
            note.push_str(&format!("; replies agree (min overlap {:.2})", score));
        } else {
            note.push_str(&format!("; replies diverge (min overlap {:.2})", score));
        }
    }
    if !flags.is_empty() {
        let providers: Vec<&str> = flags.iter().map(|f| f.provider_id.as_str()).collect();
        note.push_str(&format!(
            "; {} safety flag(s) from {}",
            flags.len(),
            providers.join(", ")
        ));
    }
    note
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CircuitBreaker, CircuitState, ProviderClient};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Scripted {
        id: &'static str,
        delay: Duration,
        timeout: Duration,
        reply: Result<&'static str, ProviderError>,
        finished: Arc<AtomicBool>,
    }

    impl Scripted {
        fn ok(id: &'static str, delay_secs: u64, text: &'static str) -> Self {
            Self {
                id,
                delay: Duration::from_secs(delay_secs),
                timeout: Duration::from_secs(30),
                reply: Ok(text),
                finished: Arc::new(AtomicBool::new(false)),
            }
        }

        fn failing(id: &'static str, error: ProviderError) -> Self {
            Self {
                reply: Err(error),
                ..Self::ok(id, 0, "")
            }
        }

        fn shared(self) -> SharedProvider {
            Arc::new(self)
        }
    }

    #[async_trait]
    impl ProviderClient for Scripted {
        fn id(&self) -> &str {
            self.id
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }

        async fn generate(
            &self,
            _prompt: &str,
            _context: &ProviderContext,
        ) -> ProviderResult<ProviderReply> {
            tokio::time::sleep(self.delay).await;
            self.finished.store(true, Ordering::SeqCst);
            self.reply.clone().map(|text| ProviderReply {
                provider_id: self.id.to_string(),
                text: text.to_string(),
            })
        }
    }

    fn context() -> ProviderContext {
        ProviderContext::new("You are a supportive care assistant.", 256)
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_timeout_still_returns_primary() {
        let registry = ProviderRegistry::new(vec![
            Scripted::ok("a", 1, "Drink a glass of water with every meal today.").shared(),
            Scripted::ok("b", 120, "never arrives").shared(),
            Scripted::ok("c", 2, "Try drinking water with each meal today.").shared(),
        ]);
        let validator = ConsensusValidator::default();

        let started = Instant::now();
        let result = validator
            .validate("hello", &context(), &registry, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.primary_provider_id, "a");
        assert_eq!(result.alternates.len(), 1);
        assert_eq!(result.alternates[0].provider_id, "c");
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].provider_id, "b");
        assert!(result.failures[0].reason.contains("Timed out"));
        // Bounded by the 12s deadline, not the 30s provider timeout
        assert!(started.elapsed() <= Duration::from_secs(13));
        assert_eq!(result.latency_ms.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_order_not_arrival_order() {
        let registry = ProviderRegistry::new(vec![
            Scripted::ok("slow-first", 5, "Slow but preferred reply about meals.").shared(),
            Scripted::ok("fast-second", 1, "Fast reply about meals.").shared(),
        ]);
        let result = ConsensusValidator::default()
            .validate("hello", &context(), &registry, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.primary_provider_id, "slow-first");
        assert_eq!(result.alternates[0].provider_id, "fast-second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_successes_is_no_provider_available() {
        let registry = ProviderRegistry::new(vec![
            Scripted::failing("a", ProviderError::RequestFailed("refused".into())).shared(),
            Scripted::failing("b", ProviderError::Http {
                status: 503,
                body: "busy".into(),
            })
            .shared(),
            Scripted::ok("c", 0, "   ").shared(),
        ]);
        let err = ConsensusValidator::default()
            .validate("hello", &context(), &registry, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ConsensusError::NoProviderAvailable {
                attempted,
                failures,
            } => {
                assert_eq!(attempted, 3);
                assert_eq!(failures.len(), 3);
                assert!(failures[2].reason.contains("empty"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let err = ConsensusValidator::default()
            .validate(
                "hello",
                &context(),
                &ProviderRegistry::new(Vec::new()),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ConsensusError::NoProviderAvailable {
                attempted: 0,
                failures: Vec::new()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disagreement_is_advisory() {
        let registry = ProviderRegistry::new(vec![
            Scripted::ok("a", 1, "Schedule your medication reminders each morning.").shared(),
            Scripted::ok("b", 1, "Consider a brisk evening stroll around the block.").shared(),
        ]);
        let result = ConsensusValidator::default()
            .validate("hello", &context(), &registry, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.all_agree);
        assert_eq!(result.primary_provider_id, "a");
        assert!(result.evaluation_note.contains("diverge"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsafe_reply_is_flagged_not_rejected() {
        let registry = ProviderRegistry::new(vec![Scripted::ok(
            "a",
            1,
            "You could just stop taking your medication if it bothers you.",
        )
        .shared()]);
        let result = ConsensusValidator::default()
            .validate("hello", &context(), &registry, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.safety_flags.len(), 1);
        assert!(result.all_agree);
        assert!(result.evaluation_note.contains("safety flag"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_drops_inflight_calls() {
        let slow = Scripted::ok("a", 10, "late");
        let finished = slow.finished.clone();
        let registry = ProviderRegistry::new(vec![slow.shared()]);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = ConsensusValidator::default()
            .validate("hello", &context(), &registry, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, ConsensusError::Cancelled);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_feed_circuit_breaker() {
        let registry = ProviderRegistry::new(vec![
            Scripted::failing("a", ProviderError::RequestFailed("down".into())).shared(),
            Scripted::ok("b", 1, "Fine reply.").shared(),
        ])
        .with_circuit_breaker(CircuitBreaker::new(1, 9999));

        let validator = ConsensusValidator::default();
        let first = validator
            .validate("hello", &context(), &registry, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.primary_provider_id, "b");
        assert_eq!(registry.circuit_state("a"), CircuitState::Open);

        let second = validator
            .validate("hello", &context(), &registry, &CancellationToken::new())
            .await
            .unwrap();
        assert!(second.failures.is_empty());
        assert_eq!(second.latency_ms.len(), 1);
    }
}

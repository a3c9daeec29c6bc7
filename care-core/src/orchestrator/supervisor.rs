//! Supervisor orchestrator
//!
//! Composes every engine component into one request → response transaction:
//!
//! ```text
//! message ─► EmergencyClassifier ─┬─ emergency ─► alert events, alert reply (done)
//!                                 └─ clear ─► ConnectivityAdapter
//!                                               ├─ offline ─► local fallback reply
//!                                               └─ online ──► ConsensusValidator
//!                                                              └─ exhausted ─► apology
//!            [per-subject lock] DirectiveRecommender ─► BadgeProgression ─► outcome
//! ```
//!
//! Side effects leave as events on the bus. Their delivery results are
//! returned with the outcome and never change the primary response.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::badge::{BadgeProgression, BadgeUpdate};
use crate::clock::{SharedClock, SystemClock};
use crate::config::EngineConfig;
use crate::connectivity::{ConnectivityAdapter, ConnectivityPolicy};
use crate::consensus::{ConsensusError, ConsensusResult, ConsensusValidator};
use crate::error::{EngineError, EngineResult};
use crate::events::{CareEvent, SharedEventBus, SideEffect};
use crate::model::{
    latest_scores, BadgeState, Category, ConnectivityLevel, Directive, FeatureId, Recommendation,
    ScoreRecord, ScoreSubmission,
};
use crate::provider::ProviderRegistry;
use crate::recommend::{CooldownLedger, DirectiveRecommender, FeatureTable, RecommendationDecision};
use crate::safety::{AlertLedger, EmergencyClassifier, SafetyVerdict};
use crate::store::{SharedStore, StoreError};

use super::locks::SubjectLocks;
use super::prompt;

/// Result of one subject message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageOutcome {
    pub reply_text: String,
    pub recommendation: Option<Recommendation>,
    /// False when `recommendation` is the previous one, returned during cooldown
    pub recommendation_is_new: bool,
    pub emergency: Option<SafetyVerdict>,
    pub consensus: Option<ConsensusResult>,
    /// `None` when an emergency short-circuited the request
    pub connectivity: Option<ConnectivityPolicy>,
    pub badge_updates: Vec<BadgeUpdate>,
    /// Every provider failed and the apology was used
    pub provider_exhausted: bool,
    pub side_effects: Vec<SideEffect>,
}

/// Result of one accepted score submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub record: ScoreRecord,
    pub badge_updates: Vec<BadgeUpdate>,
    pub recommendation: Option<Recommendation>,
    pub recommendation_is_new: bool,
    /// Set when the new record itself trips the numeric guard
    pub emergency: Option<SafetyVerdict>,
    pub side_effects: Vec<SideEffect>,
}

/// Result of one recorded feature use
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageOutcome {
    pub feature: FeatureId,
    pub badge_updates: Vec<BadgeUpdate>,
    pub side_effects: Vec<SideEffect>,
}

/// A feature use published by the current request.
///
/// `before` is the store's count read just before publishing, so the use is
/// counted once whether or not the store has applied it yet.
struct PendingUse<'a> {
    feature: &'a FeatureId,
    before: u64,
}

pub struct SupervisorOrchestrator {
    config: EngineConfig,
    classifier: EmergencyClassifier,
    connectivity: ConnectivityAdapter,
    consensus: ConsensusValidator,
    recommender: DirectiveRecommender,
    progression: BadgeProgression,
    registry: Arc<ProviderRegistry>,
    store: SharedStore,
    bus: SharedEventBus,
    clock: SharedClock,
    locks: SubjectLocks,
    ledger: Mutex<CooldownLedger>,
    alerts: Mutex<AlertLedger>,
}

impl SupervisorOrchestrator {
    pub fn new(
        config: EngineConfig,
        registry: Arc<ProviderRegistry>,
        store: SharedStore,
        bus: SharedEventBus,
    ) -> Self {
        let features = FeatureTable::with_overrides(config.feature_overrides());
        Self {
            classifier: EmergencyClassifier::new(config.classifier.clone()),
            connectivity: ConnectivityAdapter::new(config.connectivity.clone()),
            consensus: ConsensusValidator::new(config.consensus.clone()),
            recommender: DirectiveRecommender::new(features, &config.recommendation),
            progression: BadgeProgression::new(config.badges.clone()),
            ledger: Mutex::new(CooldownLedger::from_config(&config.recommendation)),
            alerts: Mutex::new(AlertLedger::from_config(&config.classifier)),
            locks: SubjectLocks::new(),
            clock: Arc::new(SystemClock),
            registry,
            store,
            bus,
            config,
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &SharedEventBus {
        &self.bus
    }

    /// Handle one inbound subject message
    pub async fn handle_subject_message(
        &self,
        subject_id: &str,
        text: &str,
        level: ConnectivityLevel,
        cancel: &CancellationToken,
    ) -> EngineResult<MessageOutcome> {
        let now = self.clock.now();
        info!(subject_id, connectivity = %level, "Handling subject message");

        let history = self.read_history(subject_id, self.config.history_limit).await;
        let verdict = self.classifier.classify(text, &history, now.date_naive());

        if verdict.is_emergency {
            let side_effects = self.raise_alert(subject_id, &verdict, now);
            let reply_text = verdict.alert_message.clone().unwrap_or_default();
            return Ok(MessageOutcome {
                reply_text,
                recommendation: None,
                recommendation_is_new: false,
                emergency: Some(verdict),
                consensus: None,
                connectivity: None,
                badge_updates: Vec::new(),
                provider_exhausted: false,
                side_effects,
            });
        }
        if !verdict.signals.is_empty() {
            debug!(subject_id, signals = verdict.signals.len(), "Safety signals below alert threshold");
        }

        let policy = self.connectivity.resolve(level);
        let directives = self.read_directives(subject_id).await;
        let latest = latest_scores(&history);

        let mut consensus = None;
        let mut provider_exhausted = false;
        let reply_text = if policy.allows_providers() {
            let context = prompt::build_context(subject_id, &directives, &latest, &policy);
            match self
                .consensus
                .validate(text, &context, &self.registry, cancel)
                .await
            {
                Ok(result) => {
                    let reply = result.primary_text.clone();
                    consensus = Some(result);
                    reply
                }
                Err(ConsensusError::NoProviderAvailable {
                    attempted,
                    failures,
                }) => {
                    warn!(
                        subject_id,
                        attempted,
                        failed = failures.len(),
                        "No provider available, replying with apology"
                    );
                    provider_exhausted = true;
                    self.config.replies.apology.clone()
                }
                Err(ConsensusError::Cancelled) => return Err(EngineError::Cancelled),
            }
        } else {
            debug!(subject_id, "Offline, skipping providers");
            self.connectivity.offline_reply().to_string()
        };

        let _guard = self.locks.lock(subject_id).await;
        let mut side_effects = Vec::new();
        let (recommendation, recommendation_is_new) = self
            .recommend(subject_id, &directives, &latest, now, &mut side_effects)
            .await;
        let badge_updates = self
            .refresh_badges(subject_id, now, None, &mut side_effects)
            .await;

        Ok(MessageOutcome {
            reply_text,
            recommendation,
            recommendation_is_new,
            emergency: None,
            consensus,
            connectivity: Some(policy),
            badge_updates,
            provider_exhausted,
            side_effects,
        })
    }

    /// Handle one daily score submission
    pub async fn handle_score_submission(
        &self,
        submission: &ScoreSubmission,
    ) -> EngineResult<SubmissionOutcome> {
        let now = self.clock.now();
        let record = submission.validate(now)?;
        let subject_id = record.subject_id.clone();
        info!(subject_id = %subject_id, date = %record.date, "Handling score submission");

        let _guard = self.locks.lock(&subject_id).await;
        match self.store.record_score(record.clone()).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                info!(subject_id = %subject_id, date = %record.date, "Duplicate submission rejected");
                return Err(EngineError::DuplicateSubmission {
                    subject_id,
                    date: record.date,
                });
            }
            Err(e) => return Err(e.into()),
        }

        let mut side_effects = vec![self
            .bus
            .publish(CareEvent::score_accepted(record.clone(), now))];

        let badge_updates = self
            .refresh_badges(&subject_id, now, None, &mut side_effects)
            .await;

        let history = self.read_history(&subject_id, self.config.history_limit).await;
        let verdict = self.classifier.classify("", &history, now.date_naive());
        if verdict.is_emergency {
            side_effects.extend(self.raise_alert(&subject_id, &verdict, now));
            return Ok(SubmissionOutcome {
                record,
                badge_updates,
                recommendation: None,
                recommendation_is_new: false,
                emergency: Some(verdict),
                side_effects,
            });
        }

        let directives = self.read_directives(&subject_id).await;
        let (recommendation, recommendation_is_new) = self
            .recommend(
                &subject_id,
                &directives,
                &latest_scores(&history),
                now,
                &mut side_effects,
            )
            .await;

        Ok(SubmissionOutcome {
            record,
            badge_updates,
            recommendation,
            recommendation_is_new,
            emergency: None,
            side_effects,
        })
    }

    /// Record one use of `feature` and recompute the subject's badges
    pub async fn handle_feature_usage(&self, subject_id: &str, feature: FeatureId) -> UsageOutcome {
        let now = self.clock.now();
        info!(subject_id, feature = %feature, "Handling feature usage");

        let _guard = self.locks.lock(subject_id).await;
        let before = self.stored_usage(subject_id, &feature).await;
        let mut side_effects = vec![self
            .bus
            .publish(CareEvent::feature_usage(subject_id, feature.clone(), now))];
        let pending = PendingUse {
            feature: &feature,
            before,
        };
        let badge_updates = self
            .refresh_badges(subject_id, now, Some(&pending), &mut side_effects)
            .await;

        UsageOutcome {
            feature,
            badge_updates,
            side_effects,
        }
    }

    fn raise_alert(
        &self,
        subject_id: &str,
        verdict: &SafetyVerdict,
        now: DateTime<Utc>,
    ) -> Vec<SideEffect> {
        let numeric = verdict.signals.first().is_some_and(|s| !s.is_lexical());
        if let (true, Some(kind)) = (numeric, verdict.kind) {
            if !self.alert_ledger().try_raise(subject_id, kind, now) {
                debug!(subject_id, kind = %kind, "Repeat numeric alert suppressed");
                return Vec::new();
            }
        }

        let mut effects = vec![self.bus.publish(CareEvent::feature_usage(
            subject_id,
            FeatureId::from(FeatureId::EMERGENCY_DETECTION),
            now,
        ))];

        if let (Some(kind), Some(severity)) = (verdict.kind, verdict.severity) {
            warn!(subject_id, kind = %kind, severity = %severity, "Emergency detected");
            let message = verdict
                .alert_message
                .clone()
                .unwrap_or_else(|| kind.alert_message().to_string());
            effects.push(self.bus.publish(CareEvent::emergency_alert(
                subject_id, kind, severity, message, now,
            )));
        }

        for effect in effects.iter().filter(|e| !e.is_delivered()) {
            warn!(subject_id, event_id = %effect.event_id(), "Emergency side effect undelivered");
        }
        effects
    }

    /// Must be called with the subject lock held
    async fn recommend(
        &self,
        subject_id: &str,
        directives: &[Directive],
        latest: &BTreeMap<Category, u8>,
        now: DateTime<Utc>,
        side_effects: &mut Vec<SideEffect>,
    ) -> (Option<Recommendation>, bool) {
        let stored = match self.store.last_recommendation(subject_id).await {
            Ok(rec) => rec,
            Err(e) => {
                warn!(subject_id, error = %e, "Failed to read last recommendation");
                None
            }
        };
        let cached = self.ledger().get(subject_id, now).cloned();
        let last = match (stored, cached) {
            (Some(a), Some(b)) => Some(if a.created_at >= b.created_at { a } else { b }),
            (a, b) => a.or(b),
        };

        let decision =
            self.recommender
                .recommend(subject_id, directives, latest, last.as_ref(), now);
        match decision {
            RecommendationDecision::Created(rec) => {
                self.ledger().record(rec.clone(), now);
                side_effects.push(
                    self.bus
                        .publish(CareEvent::recommendation_created(rec.clone(), now)),
                );
                (Some(rec), true)
            }
            RecommendationDecision::CooldownActive(rec) => (Some(rec), false),
            RecommendationDecision::NoCandidate => (None, false),
        }
    }

    /// Recompute every badge for a subject.
    ///
    /// `pending` is a feature use published in this request that the store
    /// may or may not have applied yet. Must be called with the subject lock held.
    async fn refresh_badges(
        &self,
        subject_id: &str,
        now: DateTime<Utc>,
        pending: Option<&PendingUse<'_>>,
        side_effects: &mut Vec<SideEffect>,
    ) -> Vec<BadgeUpdate> {
        let window = self.config.badges.window_days as usize;
        let history = self
            .read_history(subject_id, self.config.history_limit.max(window))
            .await;
        let stored = match self.store.badge_states(subject_id).await {
            Ok(states) => states,
            Err(e) => {
                warn!(subject_id, error = %e, "Failed to read badge states, skipping badges");
                return Vec::new();
            }
        };

        let mut states: BTreeMap<Category, BadgeState> = stored
            .into_iter()
            .map(|state| (state.category.clone(), state))
            .collect();

        let mut categories: BTreeSet<Category> =
            self.config.tracked_categories.iter().cloned().collect();
        categories.extend(history.iter().flat_map(|r| r.scores.keys().cloned()));
        categories.extend(states.keys().cloned());

        let engagement = &self.config.badges.engagement_feature;
        let mut updates = Vec::new();
        for category in categories {
            let feature = self.recommender.features().feature_for(&category);
            let mut uses = self.usage_count(subject_id, feature, pending).await;
            if feature != engagement {
                uses += self.usage_count(subject_id, engagement, pending).await;
            }
            let evidence = self
                .progression
                .evidence(&category, &history, uses, now.date_naive());

            let state = match states.remove(&category) {
                Some(state) => state,
                // Created lazily, once there is something to show
                None if evidence.submitted_days > 0 || evidence.feature_uses > 0 => {
                    BadgeState::new(subject_id, category.clone())
                }
                None => continue,
            };

            if let Some(update) = self.progression.step(&state, evidence, now) {
                side_effects.push(self.bus.publish(CareEvent::badge_updated(
                    update.previous_level,
                    update.state.clone(),
                    now,
                )));
                updates.push(update);
            }
        }
        updates
    }

    async fn usage_count(
        &self,
        subject_id: &str,
        feature: &FeatureId,
        pending: Option<&PendingUse<'_>>,
    ) -> u64 {
        let stored = self.stored_usage(subject_id, feature).await;
        match pending {
            Some(pending) if pending.feature == feature => stored.max(pending.before + 1),
            _ => stored,
        }
    }

    async fn stored_usage(&self, subject_id: &str, feature: &FeatureId) -> u64 {
        match self.store.feature_usage_count(subject_id, feature).await {
            Ok(count) => count,
            Err(e) => {
                warn!(subject_id, feature = %feature, error = %e, "Failed to read usage count");
                0
            }
        }
    }

    async fn read_history(&self, subject_id: &str, limit: usize) -> Vec<ScoreRecord> {
        match self.store.recent_scores(subject_id, limit).await {
            Ok(history) => history,
            Err(e) => {
                warn!(subject_id, error = %e, "Failed to read score history");
                Vec::new()
            }
        }
    }

    async fn read_directives(&self, subject_id: &str) -> Vec<Directive> {
        match self.store.active_directives(subject_id).await {
            Ok(directives) => directives,
            Err(e) => {
                warn!(subject_id, error = %e, "Failed to read directives");
                Vec::new()
            }
        }
    }

    fn ledger(&self) -> MutexGuard<'_, CooldownLedger> {
        self.ledger.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn alert_ledger(&self) -> MutexGuard<'_, AlertLedger> {
        self.alerts.lock().unwrap_or_else(|p| p.into_inner())
    }
}

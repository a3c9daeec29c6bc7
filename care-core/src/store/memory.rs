//! In-memory store with optional JSON file persistence

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::events::{CareEvent, EventId};
use crate::model::{
    BadgeState, Category, Directive, FeatureId, Recommendation, ScoreRecord, SubjectId,
};

use super::{CareStore, StoreError, StoreResult};

/// Everything the store holds, as written to the state file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub directives: Vec<Directive>,
    pub scores: BTreeMap<SubjectId, BTreeMap<NaiveDate, ScoreRecord>>,
    pub badges: BTreeMap<SubjectId, BTreeMap<Category, BadgeState>>,
    pub recommendations: BTreeMap<SubjectId, Vec<Recommendation>>,
    pub feature_usage: BTreeMap<SubjectId, BTreeMap<FeatureId, u64>>,
    /// Emergency alerts awaiting the care team
    pub alerts: Vec<CareEvent>,
    /// Ids of events already applied
    pub applied_events: BTreeSet<EventId>,
}

/// `CareStore` over an in-process snapshot
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Load a state file; a missing file yields an empty store
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "State file not found, starting empty");
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path)?;
        let snapshot: StoreSnapshot = serde_json::from_str(&raw)?;
        debug!(
            path = %path.display(),
            subjects = snapshot.scores.len(),
            directives = snapshot.directives.len(),
            "State file loaded"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the state file, replacing it atomically
    pub async fn save(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        let json = {
            let state = self.state.read().await;
            serde_json::to_string_pretty(&*state)?
        };
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        self.state.read().await.clone()
    }

    pub async fn add_directive(&self, directive: Directive) {
        let mut state = self.state.write().await;
        state.directives.retain(|d| d.id != directive.id);
        state.directives.push(directive);
    }

    /// Apply one event; returns false if it was already applied
    pub async fn apply(&self, event: &CareEvent) -> bool {
        let mut state = self.state.write().await;
        if !state.applied_events.insert(event.event_id().to_string()) {
            debug!(event_id = %event.event_id(), "Event already applied");
            return false;
        }

        match event {
            CareEvent::FeatureUsage {
                subject_id, feature, ..
            } => {
                *state
                    .feature_usage
                    .entry(subject_id.clone())
                    .or_default()
                    .entry(feature.clone())
                    .or_insert(0) += 1;
            }
            CareEvent::RecommendationCreated { recommendation, .. } => {
                state
                    .recommendations
                    .entry(recommendation.subject_id.clone())
                    .or_default()
                    .push(recommendation.clone());
            }
            CareEvent::BadgeUpdated { state: badge, .. } => {
                let slot = state
                    .badges
                    .entry(badge.subject_id.clone())
                    .or_default()
                    .entry(badge.category.clone());
                match slot {
                    std::collections::btree_map::Entry::Occupied(mut existing) => {
                        // Levels only move forward
                        if badge.level >= existing.get().level {
                            existing.insert(badge.clone());
                        }
                    }
                    std::collections::btree_map::Entry::Vacant(empty) => {
                        empty.insert(badge.clone());
                    }
                }
            }
            CareEvent::EmergencyAlert { .. } => {
                state.alerts.push(event.clone());
            }
            CareEvent::ScoreAccepted { record, .. } => {
                state
                    .scores
                    .entry(record.subject_id.clone())
                    .or_default()
                    .entry(record.date)
                    .or_insert_with(|| record.clone());
            }
        }
        true
    }

    /// Apply every event already queued on `receiver`; returns how many were new
    pub async fn drain(&self, receiver: &mut broadcast::Receiver<CareEvent>) -> usize {
        let mut applied = 0;
        loop {
            match receiver.try_recv() {
                Ok(event) => {
                    if self.apply(&event).await {
                        applied += 1;
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(missed, "Store receiver lagged, events were dropped");
                }
                Err(_) => break,
            }
        }
        applied
    }
}

#[async_trait]
impl CareStore for MemoryStore {
    async fn active_directives(&self, subject_id: &str) -> StoreResult<Vec<Directive>> {
        let state = self.state.read().await;
        Ok(state
            .directives
            .iter()
            .filter(|d| d.active && d.subject_id == subject_id)
            .cloned()
            .collect())
    }

    async fn recent_scores(
        &self,
        subject_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<ScoreRecord>> {
        let state = self.state.read().await;
        Ok(state
            .scores
            .get(subject_id)
            .map(|days| days.values().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn badge_states(&self, subject_id: &str) -> StoreResult<Vec<BadgeState>> {
        let state = self.state.read().await;
        Ok(state
            .badges
            .get(subject_id)
            .map(|badges| badges.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn last_recommendation(&self, subject_id: &str) -> StoreResult<Option<Recommendation>> {
        let state = self.state.read().await;
        Ok(state
            .recommendations
            .get(subject_id)
            .and_then(|recs| recs.iter().max_by_key(|r| r.created_at))
            .cloned())
    }

    async fn feature_usage_count(
        &self,
        subject_id: &str,
        feature: &FeatureId,
    ) -> StoreResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .feature_usage
            .get(subject_id)
            .and_then(|counts| counts.get(feature))
            .copied()
            .unwrap_or(0))
    }

    async fn record_score(&self, record: ScoreRecord) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let days = state.scores.entry(record.subject_id.clone()).or_default();
        if days.contains_key(&record.date) {
            return Err(StoreError::Conflict(format!(
                "score record for {} on {} already exists",
                record.subject_id, record.date
            )));
        }
        days.insert(record.date, record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BadgeLevel;
    use crate::events::EventBus;
    use chrono::Utc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    fn record(d: u32, diet: u8) -> ScoreRecord {
        ScoreRecord::new("s1", day(d), BTreeMap::from([(Category::Diet, diet)]), Utc::now())
    }

    #[tokio::test]
    async fn test_record_score_conflict_keeps_first() {
        let store = MemoryStore::new();
        store.record_score(record(22, 3)).await.unwrap();
        let err = store.record_score(record(22, 9)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let scores = store.recent_scores("s1", 30).await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].score(&Category::Diet), Some(3));
    }

    #[tokio::test]
    async fn test_recent_scores_newest_first_with_limit() {
        let store = MemoryStore::new();
        for d in [20, 22, 21] {
            store.record_score(record(d, 5)).await.unwrap();
        }
        let scores = store.recent_scores("s1", 2).await.unwrap();
        let dates: Vec<_> = scores.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(22), day(21)]);
    }

    #[tokio::test]
    async fn test_apply_is_idempotent_by_event_id() {
        let store = MemoryStore::new();
        let event = CareEvent::feature_usage("s1", FeatureId::from(FeatureId::KEEP_GOING), Utc::now());
        assert!(store.apply(&event).await);
        assert!(!store.apply(&event).await);

        let keep_going = FeatureId::from(FeatureId::KEEP_GOING);
        assert_eq!(store.feature_usage_count("s1", &keep_going).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_badge_updates_never_regress() {
        let store = MemoryStore::new();
        let silver = BadgeState {
            level: BadgeLevel::Silver,
            ..BadgeState::new("s1", Category::Diet)
        };
        let bronze = BadgeState {
            level: BadgeLevel::Bronze,
            ..BadgeState::new("s1", Category::Diet)
        };
        store
            .apply(&CareEvent::badge_updated(BadgeLevel::Bronze, silver, Utc::now()))
            .await;
        store
            .apply(&CareEvent::badge_updated(BadgeLevel::Unranked, bronze, Utc::now()))
            .await;

        let states = store.badge_states("s1").await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].level, BadgeLevel::Silver);
    }

    #[tokio::test]
    async fn test_drain_applies_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let store = MemoryStore::new();

        bus.publish(CareEvent::score_accepted(record(22, 4), Utc::now()));
        bus.publish(CareEvent::feature_usage("s1", FeatureId::from(FeatureId::JOURNALING), Utc::now()));

        assert_eq!(store.drain(&mut rx).await, 2);
        assert_eq!(store.recent_scores("s1", 30).await.unwrap().len(), 1);
        assert_eq!(store.drain(&mut rx).await, 0);
    }

    #[tokio::test]
    async fn test_save_and_load_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = MemoryStore::new();
        store
            .add_directive(Directive::new("d1", "s1", Category::Diet, "Vegetables"))
            .await;
        store.record_score(record(22, 4)).await.unwrap();
        store.save(&path).await.unwrap();

        let loaded = MemoryStore::load(&path).unwrap();
        assert_eq!(loaded.snapshot().await, store.snapshot().await);
        assert_eq!(loaded.active_directives("s1").await.unwrap().len(), 1);

        let empty = MemoryStore::load(dir.path().join("missing.json")).unwrap();
        assert_eq!(empty.snapshot().await, StoreSnapshot::default());
    }
}

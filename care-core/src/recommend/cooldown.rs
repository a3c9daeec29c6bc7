//! Per-subject cooldown ledger
//!
//! Remembers each subject's latest recommendation for one cooldown window.
//! Entries expire after the TTL and the ledger never holds more than
//! `capacity` subjects; when full, the oldest entry is evicted first.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};

use crate::config::RecommendationConfig;
use crate::model::{Recommendation, SubjectId};

#[derive(Debug, Clone)]
pub struct CooldownLedger {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<SubjectId, Recommendation>,
    /// Eviction index ordered by creation time
    order: BTreeSet<(DateTime<Utc>, SubjectId)>,
}

impl CooldownLedger {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: BTreeSet::new(),
        }
    }

    pub fn from_config(config: &RecommendationConfig) -> Self {
        Self::new(config.cooldown(), config.ledger_capacity)
    }

    /// Latest recommendation for `subject_id`, if still inside its TTL
    pub fn get(&self, subject_id: &str, now: DateTime<Utc>) -> Option<&Recommendation> {
        self.entries
            .get(subject_id)
            .filter(|rec| now - rec.created_at < self.ttl)
    }

    /// Remember `recommendation` as its subject's latest
    pub fn record(&mut self, recommendation: Recommendation, now: DateTime<Utc>) {
        self.purge_expired(now);

        if let Some(previous) = self.entries.remove(&recommendation.subject_id) {
            self.order
                .remove(&(previous.created_at, previous.subject_id));
        }

        while self.entries.len() >= self.capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
        }

        self.order.insert((
            recommendation.created_at,
            recommendation.subject_id.clone(),
        ));
        self.entries
            .insert(recommendation.subject_id.clone(), recommendation);
    }

    /// Drop every entry whose TTL has elapsed
    pub fn purge_expired(&mut self, now: DateTime<Utc>) {
        while let Some((created_at, _)) = self.order.first() {
            if now - *created_at < self.ttl {
                break;
            }
            if let Some((_, subject_id)) = self.order.pop_first() {
                self.entries.remove(&subject_id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, FeatureId};
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 22, 9, minute, 0).unwrap()
    }

    fn rec(subject: &str, minute: u32) -> Recommendation {
        Recommendation {
            id: format!("{}-{}", subject, minute),
            subject_id: subject.to_string(),
            directive_id: "d1".to_string(),
            category: Category::Diet,
            recommended_feature: FeatureId::from(FeatureId::DIET_LOGISTICS),
            score_at_time: 3,
            created_at: at(minute),
            followed: None,
            score_after: None,
        }
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let mut ledger = CooldownLedger::new(Duration::minutes(5), 10);
        ledger.record(rec("s1", 0), at(0));

        assert!(ledger.get("s1", at(4)).is_some());
        assert!(ledger.get("s1", at(5)).is_none());

        ledger.purge_expired(at(5));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_newer_entry_replaces_older() {
        let mut ledger = CooldownLedger::new(Duration::minutes(5), 10);
        ledger.record(rec("s1", 0), at(0));
        ledger.record(rec("s1", 2), at(2));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("s1", at(3)).unwrap().id, "s1-2");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut ledger = CooldownLedger::new(Duration::minutes(30), 2);
        ledger.record(rec("s1", 0), at(0));
        ledger.record(rec("s2", 1), at(1));
        ledger.record(rec("s3", 2), at(2));

        assert_eq!(ledger.len(), 2);
        assert!(ledger.get("s1", at(3)).is_none());
        assert!(ledger.get("s2", at(3)).is_some());
        assert!(ledger.get("s3", at(3)).is_some());
    }

    #[test]
    fn test_record_purges_expired_first() {
        let mut ledger = CooldownLedger::new(Duration::minutes(5), 2);
        ledger.record(rec("s1", 0), at(0));
        ledger.record(rec("s2", 1), at(1));
        // s1 and s2 have both expired by minute 10, so nothing live is evicted
        ledger.record(rec("s3", 10), at(10));
        assert_eq!(ledger.len(), 1);
    }
}

//! Side-effect events emitted for the storage and notification collaborators
//!
//! Every event carries a uuid so a receiver can apply it exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{BadgeLevel, BadgeState, FeatureId, Recommendation, ScoreRecord, SubjectId};
use crate::safety::{EmergencyKind, Severity};

/// Unique identifier for events
pub type EventId = String;

/// All engine side-effect events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CareEvent {
    /// A feature-usage counter increment
    FeatureUsage {
        event_id: EventId,
        subject_id: SubjectId,
        feature: FeatureId,
        timestamp: DateTime<Utc>,
    },

    /// A new recommendation to persist
    RecommendationCreated {
        event_id: EventId,
        recommendation: Recommendation,
        timestamp: DateTime<Utc>,
    },

    /// A badge state changed
    BadgeUpdated {
        event_id: EventId,
        previous_level: BadgeLevel,
        state: BadgeState,
        timestamp: DateTime<Utc>,
    },

    /// The care team must be notified
    EmergencyAlert {
        event_id: EventId,
        subject_id: SubjectId,
        kind: EmergencyKind,
        severity: Severity,
        alert_message: String,
        timestamp: DateTime<Utc>,
    },

    /// A daily score record was accepted
    ScoreAccepted {
        event_id: EventId,
        record: ScoreRecord,
        timestamp: DateTime<Utc>,
    },
}

impl CareEvent {
    /// Generate a new event ID
    pub fn new_id() -> EventId {
        Uuid::new_v4().to_string()
    }

    pub fn feature_usage(
        subject_id: impl Into<SubjectId>,
        feature: FeatureId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        CareEvent::FeatureUsage {
            event_id: Self::new_id(),
            subject_id: subject_id.into(),
            feature,
            timestamp,
        }
    }

    pub fn recommendation_created(recommendation: Recommendation, timestamp: DateTime<Utc>) -> Self {
        CareEvent::RecommendationCreated {
            event_id: Self::new_id(),
            recommendation,
            timestamp,
        }
    }

    pub fn badge_updated(
        previous_level: BadgeLevel,
        state: BadgeState,
        timestamp: DateTime<Utc>,
    ) -> Self {
        CareEvent::BadgeUpdated {
            event_id: Self::new_id(),
            previous_level,
            state,
            timestamp,
        }
    }

    pub fn emergency_alert(
        subject_id: impl Into<SubjectId>,
        kind: EmergencyKind,
        severity: Severity,
        alert_message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        CareEvent::EmergencyAlert {
            event_id: Self::new_id(),
            subject_id: subject_id.into(),
            kind,
            severity,
            alert_message: alert_message.into(),
            timestamp,
        }
    }

    pub fn score_accepted(record: ScoreRecord, timestamp: DateTime<Utc>) -> Self {
        CareEvent::ScoreAccepted {
            event_id: Self::new_id(),
            record,
            timestamp,
        }
    }

    pub fn event_id(&self) -> &str {
        match self {
            CareEvent::FeatureUsage { event_id, .. } => event_id,
            CareEvent::RecommendationCreated { event_id, .. } => event_id,
            CareEvent::BadgeUpdated { event_id, .. } => event_id,
            CareEvent::EmergencyAlert { event_id, .. } => event_id,
            CareEvent::ScoreAccepted { event_id, .. } => event_id,
        }
    }

    pub fn subject_id(&self) -> &str {
        match self {
            CareEvent::FeatureUsage { subject_id, .. } => subject_id,
            CareEvent::RecommendationCreated { recommendation, .. } => &recommendation.subject_id,
            CareEvent::BadgeUpdated { state, .. } => &state.subject_id,
            CareEvent::EmergencyAlert { subject_id, .. } => subject_id,
            CareEvent::ScoreAccepted { record, .. } => &record.subject_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CareEvent::FeatureUsage { timestamp, .. } => *timestamp,
            CareEvent::RecommendationCreated { timestamp, .. } => *timestamp,
            CareEvent::BadgeUpdated { timestamp, .. } => *timestamp,
            CareEvent::EmergencyAlert { timestamp, .. } => *timestamp,
            CareEvent::ScoreAccepted { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            CareEvent::FeatureUsage { .. } => "feature_usage",
            CareEvent::RecommendationCreated { .. } => "recommendation_created",
            CareEvent::BadgeUpdated { .. } => "badge_updated",
            CareEvent::EmergencyAlert { .. } => "emergency_alert",
            CareEvent::ScoreAccepted { .. } => "score_accepted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = CareEvent::feature_usage("s1", FeatureId::from(FeatureId::KEEP_GOING), Utc::now());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "feature_usage");
        assert_eq!(json["feature"], "keep_going");

        let back: CareEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_ids_are_unique() {
        let now = Utc::now();
        let a = CareEvent::feature_usage("s1", FeatureId::from(FeatureId::JOURNALING), now);
        let b = CareEvent::feature_usage("s1", FeatureId::from(FeatureId::JOURNALING), now);
        assert_ne!(a.event_id(), b.event_id());
        assert_eq!(a.subject_id(), "s1");
        assert_eq!(a.event_type(), "feature_usage");
    }
}

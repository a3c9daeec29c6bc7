//! Directive recommender
//!
//! Picks at most one feature for a subject: the lowest-scoring category
//! that has an active directive, mapped through the [`FeatureTable`].

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::RecommendationConfig;
use crate::model::{Category, Directive, Recommendation};

use super::FeatureTable;

/// What the recommender decided for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "recommendation", rename_all = "snake_case")]
pub enum RecommendationDecision {
    /// A new recommendation to be recorded
    Created(Recommendation),
    /// Still inside the cooldown window; the previous one, unchanged
    CooldownActive(Recommendation),
    /// No scored category has an active directive
    NoCandidate,
}

impl RecommendationDecision {
    pub fn recommendation(&self) -> Option<&Recommendation> {
        match self {
            Self::Created(rec) | Self::CooldownActive(rec) => Some(rec),
            Self::NoCandidate => None,
        }
    }

    pub fn into_recommendation(self) -> Option<Recommendation> {
        match self {
            Self::Created(rec) | Self::CooldownActive(rec) => Some(rec),
            Self::NoCandidate => None,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

#[derive(Debug, Clone)]
pub struct DirectiveRecommender {
    features: FeatureTable,
    cooldown: Duration,
}

impl Default for DirectiveRecommender {
    fn default() -> Self {
        Self::new(FeatureTable::default(), &RecommendationConfig::default())
    }
}

impl DirectiveRecommender {
    pub fn new(features: FeatureTable, config: &RecommendationConfig) -> Self {
        Self {
            features,
            cooldown: config.cooldown(),
        }
    }

    pub fn features(&self) -> &FeatureTable {
        &self.features
    }

    /// Whether `last` still blocks a new recommendation at `now`
    pub fn in_cooldown(&self, last: &Recommendation, now: DateTime<Utc>) -> bool {
        now - last.created_at < self.cooldown
    }

    pub fn recommend(
        &self,
        subject_id: &str,
        directives: &[Directive],
        latest_scores: &BTreeMap<Category, u8>,
        last: Option<&Recommendation>,
        now: DateTime<Utc>,
    ) -> RecommendationDecision {
        if let Some(last) = last.filter(|rec| self.in_cooldown(rec, now)) {
            debug!(subject_id, previous = %last.id, "Recommendation cooldown active");
            return RecommendationDecision::CooldownActive(last.clone());
        }

        let mut candidates: Vec<(&Category, u8)> =
            latest_scores.iter().map(|(c, s)| (c, *s)).collect();
        candidates.sort_by(|a, b| {
            a.1.cmp(&b.1)
                .then_with(|| a.0.priority_key().cmp(&b.0.priority_key()))
        });

        for (category, score) in candidates {
            let directive = directives
                .iter()
                .filter(|d| d.active && d.subject_id == subject_id && &d.category == category)
                .min_by(|a, b| a.id.cmp(&b.id));

            let Some(directive) = directive else {
                continue;
            };

            let feature = self.features.feature_for(category).clone();
            debug!(
                subject_id,
                category = %category,
                score,
                feature = %feature,
                "Recommending feature"
            );

            return RecommendationDecision::Created(Recommendation {
                id: Uuid::new_v4().to_string(),
                subject_id: subject_id.to_string(),
                directive_id: directive.id.clone(),
                category: category.clone(),
                recommended_feature: feature,
                score_at_time: score,
                created_at: now,
                followed: None,
                score_after: None,
            });
        }

        RecommendationDecision::NoCandidate
    }
}

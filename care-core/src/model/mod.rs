//! Data model for scores, directives, recommendations and badges

pub mod badge;
pub mod types;

pub use badge::{BadgeEvidence, BadgeLevel, BadgeState};
pub use types::{
    latest_scores, Category, ConnectivityLevel, Directive, DirectiveId, FeatureId, InvalidScore,
    Recommendation, RecommendationId, ScoreRecord, ScoreSubmission, SubjectId, MAX_SCORE,
};

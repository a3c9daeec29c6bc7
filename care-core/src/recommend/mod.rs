//! Feature recommendation from directives and recent scores

pub mod cooldown;
pub mod features;
pub mod recommender;

pub use cooldown::CooldownLedger;
pub use features::FeatureTable;
pub use recommender::{DirectiveRecommender, RecommendationDecision};

//! Core data model shared by every engine component
//!
//! These are plain values: the engine reads them from the storage
//! collaborator, derives new values, and hands them back as events.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of the patient a record belongs to
pub type SubjectId = String;

/// Identifier of a clinician-authored directive
pub type DirectiveId = String;

/// Identifier of an emitted recommendation
pub type RecommendationId = String;

/// Highest value a category score may take
pub const MAX_SCORE: u8 = 10;

/// Health category a score or directive belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Diet,
    Exercise,
    Medication,
    Hydration,
    MentalHealth,
    /// Any category the care team tracks that the engine has no special rules for
    Other(String),
}

impl Category {
    /// Parse a category name; unknown names become `Other`
    pub fn parse(name: &str) -> Self {
        let normalized = name.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "diet" => Self::Diet,
            "exercise" => Self::Exercise,
            "medication" | "medications" => Self::Medication,
            "hydration" => Self::Hydration,
            "mental_health" | "mentalhealth" => Self::MentalHealth,
            _ => Self::Other(normalized),
        }
    }

    /// Tie-break rank: lower ranks win when two categories score the same
    pub fn priority_rank(&self) -> u8 {
        match self {
            Self::Diet => 0,
            Self::Exercise => 1,
            Self::Medication => 2,
            Self::MentalHealth => 3,
            Self::Hydration => 4,
            Self::Other(_) => 5,
        }
    }

    /// Total ordering key used for tie-breaking (rank, then name)
    pub fn priority_key(&self) -> (u8, String) {
        (self.priority_rank(), self.to_string())
    }

    /// The three categories a daily submission always carries
    pub fn default_tracked() -> Vec<Category> {
        vec![Self::Diet, Self::Exercise, Self::Medication]
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Diet => write!(f, "diet"),
            Self::Exercise => write!(f, "exercise"),
            Self::Medication => write!(f, "medication"),
            Self::Hydration => write!(f, "hydration"),
            Self::MentalHealth => write!(f, "mental_health"),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.to_string()
    }
}

impl FromStr for Category {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Application feature the engine can point a subject towards
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(String);

impl FeatureId {
    pub const DIET_LOGISTICS: &'static str = "diet-logistics";
    pub const WEARABLES: &'static str = "wearables";
    pub const HEALTH_SNAPSHOTS: &'static str = "health-snapshots";
    pub const JOURNALING: &'static str = "journaling";
    pub const FOOD_DATABASE: &'static str = "food-database";
    pub const KEEP_GOING: &'static str = "keep_going";
    pub const EMERGENCY_DETECTION: &'static str = "emergency_detection";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeatureId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl FromStr for FeatureId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().to_string()))
    }
}

/// One subject's self-report for one day.
///
/// At most one record exists per (subject, date). A category missing from
/// `scores` has not been submitted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub subject_id: SubjectId,
    pub date: NaiveDate,
    pub scores: BTreeMap<Category, u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl ScoreRecord {
    pub fn new(
        subject_id: impl Into<SubjectId>,
        date: NaiveDate,
        scores: BTreeMap<Category, u8>,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            date,
            scores,
            notes: None,
            submitted_at,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn score(&self, category: &Category) -> Option<u8> {
        self.scores.get(category).copied()
    }

    /// Whether every submitted category scored zero
    pub fn all_zero(&self) -> bool {
        !self.scores.is_empty() && self.scores.values().all(|s| *s == 0)
    }
}

/// Unvalidated daily scores as received from the request layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSubmission {
    pub subject_id: SubjectId,
    pub date: NaiveDate,
    pub scores: BTreeMap<Category, i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Why a submission cannot become a record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidScore {
    #[error("score {value} for {category} is outside 0..=10")]
    OutOfRange { category: Category, value: i64 },

    /// An empty record would still claim the subject's slot for the day
    #[error("submission carries no scores")]
    Empty,
}

impl ScoreSubmission {
    pub fn new(subject_id: impl Into<SubjectId>, date: NaiveDate) -> Self {
        Self {
            subject_id: subject_id.into(),
            date,
            scores: BTreeMap::new(),
            notes: None,
        }
    }

    pub fn with_score(mut self, category: Category, value: i64) -> Self {
        self.scores.insert(category, value);
        self
    }

    /// Check there is at least one score, every score is in range, and build the record
    pub fn validate(&self, submitted_at: DateTime<Utc>) -> Result<ScoreRecord, InvalidScore> {
        if self.scores.is_empty() {
            return Err(InvalidScore::Empty);
        }

        let mut scores = BTreeMap::new();
        for (category, value) in &self.scores {
            let score = u8::try_from(*value)
                .ok()
                .filter(|s| *s <= MAX_SCORE)
                .ok_or_else(|| InvalidScore::OutOfRange {
                    category: category.clone(),
                    value: *value,
                })?;
            scores.insert(category.clone(), score);
        }

        let mut record = ScoreRecord::new(self.subject_id.clone(), self.date, scores, submitted_at);
        record.notes = self.notes.clone();
        Ok(record)
    }
}

/// Most recent known score per category across a history.
///
/// Records may arrive in any order; the one with the latest date wins.
pub fn latest_scores(history: &[ScoreRecord]) -> BTreeMap<Category, u8> {
    let mut ordered: Vec<&ScoreRecord> = history.iter().collect();
    ordered.sort_by(|a, b| b.date.cmp(&a.date));

    let mut latest = BTreeMap::new();
    for record in ordered {
        for (category, score) in &record.scores {
            latest.entry(category.clone()).or_insert(*score);
        }
    }
    latest
}

/// A clinician-authored instruction in one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub id: DirectiveId,
    pub subject_id: SubjectId,
    pub category: Category,
    pub text: String,
    pub active: bool,
}

impl Directive {
    pub fn new(
        id: impl Into<DirectiveId>,
        subject_id: impl Into<SubjectId>,
        category: Category,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            subject_id: subject_id.into(),
            category,
            text: text.into(),
            active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// A single feature suggestion tied to one directive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: RecommendationId,
    pub subject_id: SubjectId,
    pub directive_id: DirectiveId,
    pub category: Category,
    pub recommended_feature: FeatureId,
    pub score_at_time: u8,
    pub created_at: DateTime<Utc>,
    /// Filled in later by whoever observes the subject's behaviour
    #[serde(default)]
    pub followed: Option<bool>,
    #[serde(default)]
    pub score_after: Option<u8>,
}

/// Coarse network/service availability for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityLevel {
    Full,
    Degraded,
    Offline,
}

impl std::fmt::Display for ConnectivityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Degraded => write!(f, "degraded"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

impl FromStr for ConnectivityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "online" => Ok(Self::Full),
            "degraded" | "slow" => Ok(Self::Degraded),
            "offline" | "none" => Ok(Self::Offline),
            other => Err(format!("unknown connectivity level: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    #[test]
    fn test_category_roundtrip_names() {
        assert_eq!(Category::parse("Mental-Health"), Category::MentalHealth);
        assert_eq!(Category::parse("sleep"), Category::Other("sleep".to_string()));
        assert_eq!(Category::MentalHealth.to_string(), "mental_health");

        let json = serde_json::to_string(&Category::Diet).unwrap();
        assert_eq!(json, "\"diet\"");
        let back: Category = serde_json::from_str("\"hydration\"").unwrap();
        assert_eq!(back, Category::Hydration);
    }

    #[test]
    fn test_priority_order() {
        assert!(Category::Diet.priority_key() < Category::Exercise.priority_key());
        assert!(Category::Exercise.priority_key() < Category::Medication.priority_key());
        assert!(Category::Medication.priority_key() < Category::Other("aa".into()).priority_key());
        assert!(
            Category::Other("alpha".into()).priority_key()
                < Category::Other("beta".into()).priority_key()
        );
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let submission = ScoreSubmission::new("s1", day(22))
            .with_score(Category::Diet, 4)
            .with_score(Category::Exercise, 11);
        let err = submission.validate(Utc::now()).unwrap_err();
        assert_eq!(
            err,
            InvalidScore::OutOfRange {
                category: Category::Exercise,
                value: 11
            }
        );

        let negative = ScoreSubmission::new("s1", day(22)).with_score(Category::Diet, -1);
        assert!(negative.validate(Utc::now()).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_submission() {
        let submission = ScoreSubmission::new("s1", day(22));
        assert_eq!(submission.validate(Utc::now()), Err(InvalidScore::Empty));
    }

    #[test]
    fn test_validate_builds_record() {
        let submission = ScoreSubmission::new("s1", day(22))
            .with_score(Category::Diet, 0)
            .with_score(Category::Medication, 10);
        let record = submission.validate(Utc::now()).unwrap();
        assert_eq!(record.score(&Category::Diet), Some(0));
        assert_eq!(record.score(&Category::Exercise), None);
        assert!(!record.all_zero());
    }

    #[test]
    fn test_latest_scores_prefers_newest_present_value() {
        let now = Utc::now();
        let older = ScoreRecord::new(
            "s1",
            day(20),
            BTreeMap::from([(Category::Diet, 3), (Category::Exercise, 5)]),
            now,
        );
        let newer = ScoreRecord::new("s1", day(21), BTreeMap::from([(Category::Diet, 8)]), now);

        // Out of order on purpose
        let latest = latest_scores(&[newer, older]);
        assert_eq!(latest.get(&Category::Diet), Some(&8));
        assert_eq!(latest.get(&Category::Exercise), Some(&5));
    }

    #[test]
    fn test_connectivity_parse() {
        assert_eq!("DEGRADED".parse::<ConnectivityLevel>(), Ok(ConnectivityLevel::Degraded));
        assert!("flaky".parse::<ConnectivityLevel>().is_err());
    }
}

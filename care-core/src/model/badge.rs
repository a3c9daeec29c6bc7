//! Badge levels and per-category badge state

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::types::{Category, SubjectId};

/// Achievement level, strictly ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeLevel {
    #[serde(rename = "none")]
    Unranked,
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl BadgeLevel {
    pub fn all() -> &'static [BadgeLevel] {
        &[
            BadgeLevel::Unranked,
            BadgeLevel::Bronze,
            BadgeLevel::Silver,
            BadgeLevel::Gold,
            BadgeLevel::Platinum,
        ]
    }

    /// The level a promotion from here leads to; `None` at platinum
    pub fn next(&self) -> Option<BadgeLevel> {
        match self {
            Self::Unranked => Some(Self::Bronze),
            Self::Bronze => Some(Self::Silver),
            Self::Silver => Some(Self::Gold),
            Self::Gold => Some(Self::Platinum),
            Self::Platinum => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for BadgeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unranked => write!(f, "none"),
            Self::Bronze => write!(f, "bronze"),
            Self::Silver => write!(f, "silver"),
            Self::Gold => write!(f, "gold"),
            Self::Platinum => write!(f, "platinum"),
        }
    }
}

/// Cumulative statistics a badge state was last computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeEvidence {
    /// Last day of the consistency window
    pub window_end: NaiveDate,
    /// Days in the window with a score for the category
    pub submitted_days: u32,
    /// Authoritative count of engagement feature uses
    pub feature_uses: u64,
}

/// Progress of one subject in one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeState {
    pub subject_id: SubjectId,
    pub category: Category,
    pub level: BadgeLevel,
    /// 0-100 towards the next level
    pub progress_percent: f32,
    pub last_advanced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub evidence: Option<BadgeEvidence>,
}

impl BadgeState {
    /// Fresh state, created the first time a subject/category pair is seen
    pub fn new(subject_id: impl Into<SubjectId>, category: Category) -> Self {
        Self {
            subject_id: subject_id.into(),
            category,
            level: BadgeLevel::Unranked,
            progress_percent: 0.0,
            last_advanced_at: None,
            evidence: None,
        }
    }
}

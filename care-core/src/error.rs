//! Engine-level errors
//!
//! Only conditions the caller must act on become errors. Provider failures,
//! cooldowns and emergencies are all part of a successful outcome.

use chrono::NaiveDate;
use thiserror::Error;

use crate::model::{Category, InvalidScore, SubjectId};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Scores for {subject_id} on {date} were already submitted")]
    DuplicateSubmission { subject_id: SubjectId, date: NaiveDate },

    #[error("Score {value} for {category} is outside 0..=10")]
    InvalidScore { category: Category, value: i64 },

    #[error("Submission carries no scores")]
    EmptySubmission,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Request cancelled")]
    Cancelled,
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Text safe to show the subject
    pub fn user_message(&self) -> &'static str {
        match self {
            EngineError::DuplicateSubmission { .. } => {
                "You've already submitted your scores for today."
            }
            EngineError::InvalidScore { .. } => "Scores must be whole numbers from 0 to 10.",
            EngineError::EmptySubmission => "Please enter at least one score.",
            EngineError::Store(_) => "We couldn't save that right now. Please try again shortly.",
            EngineError::Cancelled => "Your request was cancelled.",
        }
    }

    /// Whether retrying the same request could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Store(_) | EngineError::Cancelled)
    }
}

impl From<InvalidScore> for EngineError {
    fn from(err: InvalidScore) -> Self {
        match err {
            InvalidScore::OutOfRange { category, value } => {
                EngineError::InvalidScore { category, value }
            }
            InvalidScore::Empty => EngineError::EmptySubmission,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let err = EngineError::DuplicateSubmission {
            subject_id: "s1".into(),
            date: NaiveDate::from_ymd_opt(2025, 7, 22).unwrap(),
        };
        assert_eq!(
            err.user_message(),
            "You've already submitted your scores for today."
        );
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Scores for s1 on 2025-07-22 were already submitted");
    }

    #[test]
    fn test_from_invalid_score() {
        let err: EngineError = InvalidScore::OutOfRange {
            category: Category::Diet,
            value: 11,
        }
        .into();
        assert!(matches!(err, EngineError::InvalidScore { value: 11, .. }));
        assert_eq!(err.to_string(), "Score 11 for diet is outside 0..=10");

        let err: EngineError = InvalidScore::Empty.into();
        assert!(matches!(err, EngineError::EmptySubmission));
        assert!(!err.is_retryable());
    }
}

//! Badge progression state machine
//!
//! ```text
//! none ──► bronze ──► silver ──► gold ──► platinum (terminal, progress 100)
//! ```
//!
//! Every step recomputes points from the evidence it is given, never from a
//! running counter. A step promotes at most one level and carries the
//! overshoot into the new level. Replaying evidence the state has already
//! seen changes nothing, and levels never move backwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::BadgeConfig;
use crate::model::{BadgeEvidence, BadgeLevel, BadgeState, Category, ScoreRecord};

use super::stats;

/// Highest progress carried into a freshly promoted level
const CARRY_CAP: f32 = 99.0;

/// Result of applying one step to a badge state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeUpdate {
    pub previous_level: BadgeLevel,
    pub promoted: bool,
    pub state: BadgeState,
}

/// Per-category progression rules
#[derive(Debug, Clone, Default)]
pub struct BadgeProgression {
    config: BadgeConfig,
}

impl BadgeProgression {
    pub fn new(config: BadgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BadgeConfig {
        &self.config
    }

    /// Evidence for `category` as of `today`
    pub fn evidence(
        &self,
        category: &Category,
        history: &[ScoreRecord],
        feature_uses: u64,
        today: chrono::NaiveDate,
    ) -> BadgeEvidence {
        stats::evidence(&self.config, category, history, feature_uses, today)
    }

    /// Apply one step.
    ///
    /// Returns `None` when the evidence is already reflected in `state` or is
    /// older than what the state was last computed from.
    pub fn step(
        &self,
        state: &BadgeState,
        evidence: BadgeEvidence,
        now: DateTime<Utc>,
    ) -> Option<BadgeUpdate> {
        if let Some(seen) = state.evidence {
            if seen == evidence || evidence.window_end < seen.window_end {
                return None;
            }
        }

        let points = stats::points(&self.config, &evidence);
        let mut next = state.clone();
        next.evidence = Some(evidence);

        let raw = stats::progress_within(&self.config, state.level, points);
        let promoted = match state.level.next() {
            Some(level) if raw >= 100.0 => {
                next.level = level;
                next.progress_percent = if level.is_terminal() {
                    100.0
                } else {
                    stats::progress_within(&self.config, level, points).min(CARRY_CAP)
                };
                next.last_advanced_at = Some(now);
                true
            }
            Some(_) => {
                next.progress_percent = raw;
                false
            }
            None => {
                next.progress_percent = 100.0;
                false
            }
        };

        if promoted {
            info!(
                subject_id = %next.subject_id,
                category = %next.category,
                from = %state.level,
                to = %next.level,
                points,
                "Badge promoted"
            );
        }

        Some(BadgeUpdate {
            previous_level: state.level,
            promoted,
            state: next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 22, 9, 0, 0).unwrap()
    }

    fn ev(d: u32, submitted_days: u32, feature_uses: u64) -> BadgeEvidence {
        BadgeEvidence {
            window_end: day(d),
            submitted_days,
            feature_uses,
        }
    }

    fn fresh() -> BadgeState {
        BadgeState::new("s1", Category::Diet)
    }

    #[test]
    fn test_progress_without_promotion() {
        // 5 of 20 days → 12.5 points → half way to bronze
        let update = BadgeProgression::default()
            .step(&fresh(), ev(22, 5, 0), now())
            .unwrap();
        assert!(!update.promoted);
        assert_eq!(update.state.level, BadgeLevel::Unranked);
        assert!((update.state.progress_percent - 50.0).abs() < 1e-3);
        assert!(update.state.last_advanced_at.is_none());
    }

    #[test]
    fn test_promotion_carries_overshoot() {
        // Full consistency → 50 points: past bronze (25), 25/35 into silver
        let update = BadgeProgression::default()
            .step(&fresh(), ev(22, 20, 0), now())
            .unwrap();
        assert!(update.promoted);
        assert_eq!(update.previous_level, BadgeLevel::Unranked);
        assert_eq!(update.state.level, BadgeLevel::Bronze);
        assert!((update.state.progress_percent - 100.0 * 25.0 / 35.0).abs() < 1e-3);
        assert_eq!(update.state.last_advanced_at, Some(now()));
    }

    #[test]
    fn test_one_level_per_step_with_capped_carry() {
        let progression = BadgeProgression::default();
        let update = progression.step(&fresh(), ev(22, 20, 200), now()).unwrap();
        assert_eq!(update.state.level, BadgeLevel::Bronze);
        assert_eq!(update.state.progress_percent, CARRY_CAP);

        let update = progression
            .step(&update.state, ev(23, 20, 201), now())
            .unwrap();
        assert_eq!(update.state.level, BadgeLevel::Silver);
    }

    #[test]
    fn test_replay_is_idempotent() {
        let progression = BadgeProgression::default();
        let once = progression.step(&fresh(), ev(22, 20, 3), now()).unwrap().state;
        assert!(progression.step(&once, ev(22, 20, 3), now()).is_none());

        // Stale evidence from an earlier day is ignored too
        assert!(progression.step(&once, ev(21, 19, 3), now()).is_none());
    }

    #[test]
    fn test_never_regresses() {
        let progression = BadgeProgression::default();
        let mut state = fresh();
        let mut levels = vec![state.level];
        let sequence = [
            ev(1, 20, 0),
            ev(2, 20, 10),
            ev(3, 0, 0),
            ev(4, 20, 40),
            ev(5, 1, 0),
            ev(6, 20, 60),
        ];
        for evidence in sequence {
            if let Some(update) = progression.step(&state, evidence, now()) {
                state = update.state;
            }
            levels.push(state.level);
        }
        assert!(levels.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(state.level, BadgeLevel::Platinum);
    }

    #[test]
    fn test_platinum_is_terminal() {
        let progression = BadgeProgression::default();
        let gold = BadgeState {
            level: BadgeLevel::Gold,
            ..fresh()
        };
        let update = progression.step(&gold, ev(22, 20, 80), now()).unwrap();
        assert_eq!(update.state.level, BadgeLevel::Platinum);
        assert_eq!(update.state.progress_percent, 100.0);

        let update = progression
            .step(&update.state, ev(23, 0, 0), now())
            .unwrap();
        assert!(!update.promoted);
        assert_eq!(update.state.level, BadgeLevel::Platinum);
        assert_eq!(update.state.progress_percent, 100.0);
    }
}

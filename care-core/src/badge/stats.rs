//! Consistency and engagement statistics behind badge progress

use chrono::{Duration, NaiveDate};

use crate::config::BadgeConfig;
use crate::model::{BadgeEvidence, BadgeLevel, Category, ScoreRecord};

/// Recompute evidence for one category from authoritative inputs.
///
/// `history` may contain duplicates or arrive out of order; only distinct
/// days inside the window ending on `today` count.
pub fn evidence(
    config: &BadgeConfig,
    category: &Category,
    history: &[ScoreRecord],
    feature_uses: u64,
    today: NaiveDate,
) -> BadgeEvidence {
    let window_start = today - Duration::days(i64::from(config.window_days) - 1);

    let mut days: Vec<NaiveDate> = history
        .iter()
        .filter(|r| r.date >= window_start && r.date <= today)
        .filter(|r| r.scores.contains_key(category))
        .map(|r| r.date)
        .collect();
    days.sort_unstable();
    days.dedup();

    BadgeEvidence {
        window_end: today,
        submitted_days: days.len() as u32,
        feature_uses,
    }
}

/// Points earned by `evidence`
pub fn points(config: &BadgeConfig, evidence: &BadgeEvidence) -> f32 {
    let consistency = evidence.submitted_days as f32 / config.window_days.max(1) as f32;
    let engagement = evidence.feature_uses as f32 / config.usage_target.max(1) as f32;
    100.0 * consistency * config.consistency_weight + 100.0 * engagement * config.engagement_weight
}

/// Points at which `level` starts
pub fn base(config: &BadgeConfig, level: BadgeLevel) -> f32 {
    match level.index() {
        0 => 0.0,
        i => config.thresholds[i - 1],
    }
}

/// Progress within `level` for `points`, floored at 0 and uncapped above.
///
/// Platinum has no next level and always reads 100.
pub fn progress_within(config: &BadgeConfig, level: BadgeLevel, points: f32) -> f32 {
    let Some(next) = level.next() else {
        return 100.0;
    };
    let start = base(config, level);
    let span = base(config, next) - start;
    (100.0 * (points - start) / span).max(0.0)
}

//! Emergency classifier
//!
//! Runs ahead of every other component. Pure and deterministic: the same
//! message, history and day always produce the same verdict, and nothing
//! here touches the network.

use chrono::NaiveDate;

use crate::config::ClassifierConfig;
use crate::model::ScoreRecord;

use super::patterns::{CRISIS_PATTERNS, REPLY_PATTERNS};
use super::types::{
    EmergencyKind, ReplyFlag, SafetySignal, SafetyVerdict, Severity, SignalSource,
};

/// Lexical and numeric crisis detector
#[derive(Debug, Clone, Default)]
pub struct EmergencyClassifier {
    config: ClassifierConfig,
}

impl EmergencyClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Classify one inbound message against the subject's recent history
    pub fn classify(
        &self,
        message: &str,
        history: &[ScoreRecord],
        today: NaiveDate,
    ) -> SafetyVerdict {
        let mut signals = lexical_signals(message);
        signals.extend(self.numeric_signals(history, today));

        if signals.is_empty() {
            return SafetyVerdict::clear();
        }

        // Strongest first; lexical beats numeric at equal severity, and
        // otherwise detection order is kept (stable sort).
        signals.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.is_lexical().cmp(&a.is_lexical()))
        });

        let strongest = &signals[0];
        let severity = strongest.severity;
        let kind = strongest.kind;
        let is_emergency = severity >= self.config.alert_threshold;

        SafetyVerdict {
            is_emergency,
            kind: Some(kind),
            severity: Some(severity),
            alert_message: is_emergency.then(|| kind.alert_message().to_string()),
            signals,
        }
    }

    fn numeric_signals(&self, history: &[ScoreRecord], today: NaiveDate) -> Vec<SafetySignal> {
        let mut out = Vec::new();

        let last_submission = history
            .iter()
            .map(|r| r.date)
            .filter(|d| *d <= today)
            .max();

        // A brand-new subject has nothing to miss yet
        if let Some(last) = last_submission {
            let missed = (today - last).num_days() - 1;
            if missed >= i64::from(self.config.missed_day_threshold) {
                out.push(SafetySignal {
                    kind: EmergencyKind::Disengagement,
                    severity: EmergencyKind::Disengagement.severity(),
                    source: SignalSource::Numeric {
                        detail: format!("{} consecutive days without a submission", missed),
                    },
                });
            }
        }

        if history.iter().any(|r| r.date == today && r.all_zero()) {
            out.push(SafetySignal {
                kind: EmergencyKind::ZeroScoreDay,
                severity: EmergencyKind::ZeroScoreDay.severity(),
                source: SignalSource::Numeric {
                    detail: format!("every category scored 0 on {}", today),
                },
            });
        }

        out
    }
}

fn lexical_signals(message: &str) -> Vec<SafetySignal> {
    let mut out: Vec<SafetySignal> = Vec::new();
    for pattern in CRISIS_PATTERNS.iter() {
        // One signal per kind is enough
        if out.iter().any(|s| s.kind == pattern.kind) {
            continue;
        }
        if let Some(found) = pattern.regex.find(message) {
            out.push(SafetySignal {
                kind: pattern.kind,
                severity: pattern.kind.severity(),
                source: SignalSource::Lexical {
                    matched: found.as_str().to_string(),
                    description: pattern.description.to_string(),
                },
            });
        }
    }
    out
}

/// Screen a provider reply for advice the assistant must not give
pub fn screen_reply(provider_id: &str, text: &str) -> Vec<ReplyFlag> {
    REPLY_PATTERNS
        .iter()
        .filter_map(|pattern| {
            pattern.regex.find(text).map(|found| ReplyFlag {
                provider_id: provider_id.to_string(),
                concern: pattern.concern,
                matched: found.as_str().to_string(),
                description: pattern.description.to_string(),
            })
        })
        .collect()
}

/// Highest severity among signals, if any fired
pub fn max_severity(signals: &[SafetySignal]) -> Option<Severity> {
    signals.iter().map(|s| s.severity).max()
}

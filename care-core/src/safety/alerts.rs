//! Repeat suppression for numeric alerts
//!
//! A numeric guard such as disengagement stays true on every request until
//! the subject submits again. The ledger lets one alert per subject and kind
//! through per window. Lexical crisis signals never pass through here.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::config::ClassifierConfig;
use crate::model::SubjectId;

use super::types::EmergencyKind;

/// Prune expired entries once the map grows past this many keys
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone)]
pub struct AlertLedger {
    window: Duration,
    raised: HashMap<(SubjectId, EmergencyKind), DateTime<Utc>>,
}

impl AlertLedger {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            raised: HashMap::new(),
        }
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(config.repeat_alert_window())
    }

    /// Whether an alert of `kind` should go out now; records it if so
    pub fn try_raise(&mut self, subject_id: &str, kind: EmergencyKind, now: DateTime<Utc>) -> bool {
        if self.raised.len() >= PRUNE_THRESHOLD {
            let window = self.window;
            self.raised.retain(|_, at| now - *at < window);
        }

        let key = (subject_id.to_string(), kind);
        match self.raised.get(&key) {
            Some(at) if now - *at < self.window => false,
            _ => {
                self.raised.insert(key, now);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.raised.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raised.is_empty()
    }
}

//! Connectivity adapter: maps a coarse connectivity signal to a response policy
//!
//! ```text
//! ConnectivityLevel
//!   ├─ Full     → QualityTier::Full        (providers called, full budget)
//!   ├─ Degraded → QualityTier::Full        (same quality, flagged as degraded)
//!   └─ Offline  → QualityTier::Unavailable (no provider call, local fallback reply)
//! ```
//!
//! A live request never silently gets a lower-quality answer; `Degraded`
//! only makes the change observable to the caller.

use serde::{Deserialize, Serialize};

use crate::config::ConnectivityConfig;
use crate::model::ConnectivityLevel;

/// Provider quality tier a request is served at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Full,
    /// Reserved: lower-cost models or shorter answers
    Degraded,
    Unavailable,
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// How a request should be served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityPolicy {
    /// The level this policy was resolved from
    pub level: ConnectivityLevel,
    pub tier: QualityTier,
    pub max_tokens: u32,
    /// Whether the caller should surface a connectivity warning
    pub degraded: bool,
}

impl ConnectivityPolicy {
    /// Whether providers may be called at all
    pub fn allows_providers(&self) -> bool {
        self.tier != QualityTier::Unavailable
    }
}

/// Stateless mapping from connectivity level to policy
#[derive(Debug, Clone, Default)]
pub struct ConnectivityAdapter {
    config: ConnectivityConfig,
}

impl ConnectivityAdapter {
    pub fn new(config: ConnectivityConfig) -> Self {
        Self { config }
    }

    pub fn resolve(&self, level: ConnectivityLevel) -> ConnectivityPolicy {
        match level {
            ConnectivityLevel::Full => ConnectivityPolicy {
                level,
                tier: QualityTier::Full,
                max_tokens: self.config.max_tokens,
                degraded: false,
            },
            ConnectivityLevel::Degraded => ConnectivityPolicy {
                level,
                tier: QualityTier::Full,
                max_tokens: self.config.max_tokens,
                degraded: true,
            },
            ConnectivityLevel::Offline => ConnectivityPolicy {
                level,
                tier: QualityTier::Unavailable,
                max_tokens: 0,
                degraded: true,
            },
        }
    }

    /// Reply used when no provider call is attempted
    pub fn offline_reply(&self) -> &str {
        &self.config.offline_reply
    }
}

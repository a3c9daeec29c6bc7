//! Safety verdict types

use serde::{Deserialize, Serialize};

/// How urgently a signal needs a human
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Moderate => write!(f, "moderate"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// What kind of situation a signal points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyKind {
    SelfHarm,
    MedicalCrisis,
    AcuteDistress,
    /// Several days in a row without a submission
    Disengagement,
    /// Every category scored zero today
    ZeroScoreDay,
}

impl EmergencyKind {
    /// Severity a signal of this kind carries
    pub fn severity(&self) -> Severity {
        match self {
            Self::SelfHarm | Self::MedicalCrisis => Severity::Critical,
            Self::AcuteDistress | Self::ZeroScoreDay => Severity::High,
            Self::Disengagement => Severity::Moderate,
        }
    }

    /// Message shown to the subject instead of a generated reply
    pub fn alert_message(&self) -> &'static str {
        match self {
            Self::SelfHarm => {
                "It sounds like you're going through something really painful, and you don't \
                 have to face it alone. If you are in immediate danger, call 911 or your local \
                 emergency number. You can call or text 988 any time to reach the Suicide & \
                 Crisis Lifeline. Your care team has been notified."
            }
            Self::MedicalCrisis => {
                "What you're describing may need urgent medical attention. Please call 911 or \
                 go to the nearest emergency room now. Your care team has been notified."
            }
            Self::AcuteDistress => {
                "I'm sorry you're feeling this way. Try taking a few slow, deep breaths. Your \
                 care team has been notified and will reach out. If things get worse, call or \
                 text 988 any time."
            }
            Self::Disengagement => {
                "We haven't heard from you in a few days and wanted to check in. Your care \
                 team has been notified and will reach out soon."
            }
            Self::ZeroScoreDay => {
                "Today's scores suggest you're having a really hard day. Your care team has \
                 been notified and will reach out. If you feel unsafe, call 911 or text 988."
            }
        }
    }

    fn is_lexical(&self) -> bool {
        matches!(
            self,
            Self::SelfHarm | Self::MedicalCrisis | Self::AcuteDistress
        )
    }
}

impl std::fmt::Display for EmergencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelfHarm => write!(f, "self_harm"),
            Self::MedicalCrisis => write!(f, "medical_crisis"),
            Self::AcuteDistress => write!(f, "acute_distress"),
            Self::Disengagement => write!(f, "disengagement"),
            Self::ZeroScoreDay => write!(f, "zero_score_day"),
        }
    }
}

/// Where a signal came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SignalSource {
    /// A phrase in the message text
    Lexical { matched: String, description: String },
    /// The score history
    Numeric { detail: String },
}

/// One reason the classifier raised concern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySignal {
    pub kind: EmergencyKind,
    pub severity: Severity,
    pub source: SignalSource,
}

impl SafetySignal {
    pub fn is_lexical(&self) -> bool {
        self.kind.is_lexical()
    }
}

/// Outcome of classifying one inbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub is_emergency: bool,
    pub kind: Option<EmergencyKind>,
    pub severity: Option<Severity>,
    pub alert_message: Option<String>,
    /// Every signal that fired, strongest first
    pub signals: Vec<SafetySignal>,
}

impl SafetyVerdict {
    /// Verdict with no signals
    pub fn clear() -> Self {
        Self {
            is_emergency: false,
            kind: None,
            severity: None,
            alert_message: None,
            signals: Vec::new(),
        }
    }
}

/// Unsafe content found in a provider reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyConcern {
    MedicationChange,
    Diagnosis,
    Alarmist,
}

impl std::fmt::Display for ReplyConcern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MedicationChange => write!(f, "medication_change"),
            Self::Diagnosis => write!(f, "diagnosis"),
            Self::Alarmist => write!(f, "alarmist"),
        }
    }
}

/// A concern attributed to one provider's reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyFlag {
    pub provider_id: String,
    pub concern: ReplyConcern,
    pub matched: String,
    pub description: String,
}

//! Safety gate: crisis detection on inbound text and screening of replies

pub mod alerts;
pub mod classifier;
pub(crate) mod patterns;
pub mod types;

pub use alerts::AlertLedger;
pub use classifier::{max_severity, screen_reply, EmergencyClassifier};
pub use types::{
    EmergencyKind, ReplyConcern, ReplyFlag, SafetySignal, SafetyVerdict, Severity, SignalSource,
};

//! Curated phrase sets
//!
//! Compiled once on first use. Inbound patterns look for crisis language in
//! what the subject wrote; outbound patterns look for unsafe advice in what a
//! provider wrote back.

use std::sync::LazyLock;

use regex::Regex;

use super::types::{EmergencyKind, ReplyConcern};

/// A compiled inbound phrase with the kind of emergency it indicates
pub(crate) struct CrisisPattern {
    pub regex: Regex,
    pub kind: EmergencyKind,
    pub description: &'static str,
}

/// A compiled outbound phrase with the concern it raises
pub(crate) struct ReplyPattern {
    pub regex: Regex,
    pub concern: ReplyConcern,
    pub description: &'static str,
}

/// Inbound patterns, most severe group first. Order matters for tie-breaks.
pub(crate) static CRISIS_PATTERNS: LazyLock<Vec<CrisisPattern>> = LazyLock::new(|| {
    vec![
        crisis(
            r"(?i)\bend\s+(?:it\s+all|my\s+life|everything)\b",
            EmergencyKind::SelfHarm,
            "Ending one's life",
        ),
        crisis(
            r"(?i)\b(?:kill|hurt|harm|cut)\s+my\s*self\b",
            EmergencyKind::SelfHarm,
            "Intent to self-harm",
        ),
        crisis(
            r"(?i)\bsuicid(?:e|al)\b",
            EmergencyKind::SelfHarm,
            "Suicide mention",
        ),
        crisis(
            r"(?i)\b(?:want|wanna|going)\s+(?:to\s+)?die\b",
            EmergencyKind::SelfHarm,
            "Wish to die",
        ),
        crisis(
            r"(?i)\bbetter\s+off\s+(?:dead|without\s+me)\b",
            EmergencyKind::SelfHarm,
            "Better off dead",
        ),
        crisis(
            r"(?i)\btake\s+my\s+(?:own\s+)?life\b",
            EmergencyKind::SelfHarm,
            "Taking one's life",
        ),
        crisis(
            r"(?i)\bno\s+(?:reason|point)\s+(?:to|in)\s+(?:live|living|going\s+on)\b",
            EmergencyKind::SelfHarm,
            "No reason to live",
        ),
        crisis(
            r"(?i)\bchest\s+pains?\b",
            EmergencyKind::MedicalCrisis,
            "Chest pain",
        ),
        crisis(
            r"(?i)\b(?:can[’']?t|cannot|unable\s+to)\s+breathe\b",
            EmergencyKind::MedicalCrisis,
            "Breathing difficulty",
        ),
        crisis(
            r"(?i)\boverdos(?:e|ed|ing)\b",
            EmergencyKind::MedicalCrisis,
            "Overdose",
        ),
        crisis(
            r"(?i)\btook\s+too\s+many\s+(?:pills|tablets|meds)\b",
            EmergencyKind::MedicalCrisis,
            "Too many pills",
        ),
        crisis(
            r"(?i)\b(?:heart\s+attack|having\s+a\s+stroke|seizure)\b",
            EmergencyKind::MedicalCrisis,
            "Acute cardiac/neurological event",
        ),
        crisis(
            r"(?i)\b(?:passed|passing)\s+out\b|\bfainted\b",
            EmergencyKind::MedicalCrisis,
            "Loss of consciousness",
        ),
        crisis(
            r"(?i)\bpanic\s+attack\b",
            EmergencyKind::AcuteDistress,
            "Panic attack",
        ),
        crisis(
            r"(?i)\b(?:can[’']?t|cannot)\s+(?:cope|go\s+on|take\s+(?:it|this)\s+any\s*more)\b",
            EmergencyKind::AcuteDistress,
            "Unable to cope",
        ),
        crisis(
            r"(?i)\bhopeless\b",
            EmergencyKind::AcuteDistress,
            "Hopelessness",
        ),
        crisis(
            r"(?i)\b(?:having\s+a\s+breakdown|breaking\s+down)\b",
            EmergencyKind::AcuteDistress,
            "Breakdown",
        ),
    ]
});

/// Outbound patterns for advice a care assistant must not give
pub(crate) static REPLY_PATTERNS: LazyLock<Vec<ReplyPattern>> = LazyLock::new(|| {
    vec![
        reply(
            r"(?i)\b(?:stop|discontinue|quit)\s+taking\s+(?:your\s+)?(?:medication|meds|medicine|pills)\b",
            ReplyConcern::MedicationChange,
            "Tells the subject to stop medication",
        ),
        reply(
            r"(?i)\b(?:double|increase|decrease|reduce|skip)\s+(?:your\s+)?(?:dose|dosage|medication|meds)\b",
            ReplyConcern::MedicationChange,
            "Tells the subject to change a dose",
        ),
        reply(
            r"(?i)\byou\s+(?:have|are\s+suffering\s+from|(?:likely|probably)\s+have)\s+(?:a\s+|an\s+)?(?:disease|disorder|condition|infection|cancer|diabetes)\b",
            ReplyConcern::Diagnosis,
            "States a diagnosis",
        ),
        reply(
            r"(?i)\b(?:life[- ]threatening|fatal|deadly|lethal)\b",
            ReplyConcern::Alarmist,
            "Alarm wording",
        ),
    ]
});

fn crisis(regex_str: &str, kind: EmergencyKind, description: &'static str) -> CrisisPattern {
    CrisisPattern {
        regex: compile(regex_str),
        kind,
        description,
    }
}

fn reply(regex_str: &str, concern: ReplyConcern, description: &'static str) -> ReplyPattern {
    ReplyPattern {
        regex: compile(regex_str),
        concern,
        description,
    }
}

fn compile(regex_str: &str) -> Regex {
    Regex::new(regex_str).expect("Invalid safety regex pattern")
}

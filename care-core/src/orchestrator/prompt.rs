//! System prompt and provider context for subject conversations.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever the preamble changes so
//! a logged reply can be traced back to the instructions that produced it.

use std::collections::BTreeMap;

use crate::connectivity::ConnectivityPolicy;
use crate::model::{Category, Directive};
use crate::provider::ProviderContext;

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.0.0";

/// Care assistant preamble shared by every provider
pub const CARE_ASSISTANT_PREAMBLE: &str = "\
You are a supportive care companion helping a patient follow the care plan \
their clinician wrote for them. Keep replies short, warm and practical.

## Rules
- Never tell the patient to start, stop or change any medication or dose.
- Never state or guess a diagnosis.
- Encourage the patient to contact their care team for anything clinical.
- Refer to the patient's directives and recent scores when they are relevant.
- Do not invent directives that are not listed in the context.";

/// Build the provider context for one subject turn
pub fn build_context(
    subject_id: &str,
    directives: &[Directive],
    latest_scores: &BTreeMap<Category, u8>,
    policy: &ConnectivityPolicy,
) -> ProviderContext {
    let mut context = ProviderContext::new(CARE_ASSISTANT_PREAMBLE, policy.max_tokens)
        .with_attribute("prompt_version", PROMPT_VERSION)
        .with_attribute("subject_id", subject_id);

    if !latest_scores.is_empty() {
        let scores: Vec<String> = latest_scores
            .iter()
            .map(|(category, score)| format!("{}={}/10", category, score))
            .collect();
        context = context.with_attribute("latest_scores", scores.join(", "));
    }

    if !directives.is_empty() {
        let lines: Vec<String> = directives
            .iter()
            .map(|d| format!("[{}] {}", d.category, d.text))
            .collect();
        context = context.with_attribute("directives", lines.join("; "));
    }

    if policy.degraded {
        context = context.with_attribute("connectivity", policy.level.to_string());
    }

    context
}

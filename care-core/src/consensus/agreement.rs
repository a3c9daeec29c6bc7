//! Keyword-overlap agreement heuristic
//!
//! Two replies "agree" when their significant words overlap enough. This is
//! a cheap signal for the caller's UI, never a gate.

use std::collections::BTreeSet;

const STOP_WORDS: &[&str] = &[
    "about", "after", "again", "also", "because", "been", "before", "being", "both", "could",
    "does", "doing", "down", "each", "even", "from", "have", "having", "here", "into", "just",
    "like", "make", "more", "most", "much", "only", "other", "over", "really", "same", "should",
    "some", "such", "than", "that", "their", "them", "then", "there", "these", "they", "this",
    "those", "through", "very", "want", "were", "what", "when", "where", "which", "while",
    "will", "with", "would", "your", "yours",
];

/// Lowercase alphanumeric words of at least `min_len` characters, minus stop words
pub fn keywords(text: &str, min_len: usize) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= min_len)
        .map(str::to_lowercase)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Jaccard similarity of two keyword sets.
///
/// Two empty sets are identical (1.0); one empty set shares nothing (0.0).
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f32 / union as f32
}

/// Agreement of the primary reply with each alternate
#[derive(Debug, Clone, PartialEq)]
pub struct AgreementReport {
    /// Score per alternate, in alternate order
    pub pairwise: Vec<f32>,
    /// Minimum pairwise score (1.0 with no alternates)
    pub score: f32,
    pub all_agree: bool,
}

pub fn measure(primary: &str, alternates: &[&str], min_len: usize, threshold: f32) -> AgreementReport {
    let primary_words = keywords(primary, min_len);
    let pairwise: Vec<f32> = alternates
        .iter()
        .map(|alt| jaccard(&primary_words, &keywords(alt, min_len)))
        .collect();

    let score = pairwise.iter().copied().fold(1.0_f32, f32::min);
    AgreementReport {
        all_agree: pairwise.iter().all(|s| *s >= threshold),
        pairwise,
        score,
    }
}

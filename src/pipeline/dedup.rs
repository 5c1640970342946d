//! Cross-page deduplication of extracted policies.
//!
//! Policy documents restate the same rule on several pages, and OCR of each
//! page introduces its own punctuation and spacing noise. Two rules are
//! duplicates when their *signatures* are equal: the text lowercased, with
//! punctuation removed and whitespace collapsed. Paraphrases have different
//! signatures and are kept.

use crate::model::PolicyRule;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static RE_PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Deduplication key of a policy text.
pub fn signature(text: &str) -> String {
    let lower = text.to_lowercase();
    let stripped = RE_PUNCTUATION.replace_all(&lower, "");
    RE_WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Drop rules whose signature was already seen, keeping first occurrences,
/// then number the survivors `p1..pN` in order.
pub fn deduplicate(rules: Vec<PolicyRule>) -> Vec<PolicyRule> {
    let mut seen = HashSet::with_capacity(rules.len());
    let mut unique: Vec<PolicyRule> = rules
        .into_iter()
        .filter(|rule| seen.insert(signature(&rule.text)))
        .collect();

    assign_ids(&mut unique);
    unique
}

/// Overwrite ids with `p1..pN` in slice order.
pub fn assign_ids(rules: &mut [PolicyRule]) {
    for (i, rule) in rules.iter_mut().enumerate() {
        rule.id = format!("p{}", i + 1);
    }
}

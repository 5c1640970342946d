//! JSON recovery: pull a JSON object out of free-form model output.
//!
//! Models are asked for a bare JSON object but routinely wrap it in prose or
//! ```` ```json ```` fences. Recovery runs in two phases:
//!
//! 1. Parse the whole trimmed reply. Well-behaved replies stop here.
//! 2. Scan brace-delimited spans in order of appearance. For each `{`, left
//!    to right, try every later `}` from the last one backwards; the first
//!    span that parses as an object wins. The very first candidate is
//!    therefore the greedy first-`{`-to-last-`}` span.
//!
//! The scan is not nesting-aware and does not repair broken JSON. When a
//! reply holds more than one valid object the earliest, outermost one is
//! returned, which is not necessarily the one the caller wanted.
//!
//! Phase 2 is quadratic in the number of braces, so it stops after
//! [`MAX_CANDIDATES`] parse attempts and reports no JSON, even if a later
//! span would have parsed.

use crate::error::ExpenseError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

/// Upper bound on candidate spans tried in phase 2.
pub const MAX_CANDIDATES: usize = 512;

/// Recover the first well-formed JSON object in `text`.
///
/// Returns `None` when no object can be found.
pub fn recover_object(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Some(map);
    }

    let opens: Vec<usize> = trimmed.match_indices('{').map(|(i, _)| i).collect();
    let closes: Vec<usize> = trimmed.match_indices('}').map(|(i, _)| i).collect();

    let mut attempts = 0usize;
    for &start in &opens {
        for &end in closes.iter().rev().take_while(|&&end| end > start) {
            if attempts == MAX_CANDIDATES {
                debug!("JSON recovery gave up after {} candidates", attempts);
                return None;
            }
            attempts += 1;

            // Braces are ASCII, so both indices sit on char boundaries.
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                debug!("Recovered JSON object after {} candidates", attempts);
                return Some(map);
            }
        }
    }

    None
}

/// Recover a JSON object and deserialise it into `T`.
///
/// `context` names the kind of reply in error messages ("policy", "invoice", ...).
pub fn recover_as<T: DeserializeOwned>(text: &str, context: &str) -> Result<T, ExpenseError> {
    let map = recover_object(text).ok_or_else(|| ExpenseError::NoValidJson {
        context: context.to_string(),
    })?;

    serde_json::from_value(Value::Object(map)).map_err(|e| ExpenseError::MalformedResponse {
        context: context.to_string(),
        detail: e.to_string(),
    })
}

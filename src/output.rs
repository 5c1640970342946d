//! Result types returned by the policy extraction entry points.

use crate::error::PageError;
use crate::model::{CatalogRule, PolicyRule};
use serde::{Deserialize, Serialize};

/// Deduplicated policies extracted from one document, text or URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyExtraction {
    /// Rules with ids `p1..pN`, in first-seen order.
    pub policies: Vec<PolicyRule>,

    /// Number of rendered pages. Absent for text input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,

    /// Pages that contributed no rules because processing failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub page_errors: Vec<PageError>,
}

impl PolicyExtraction {
    /// The rules as a compliance catalog.
    pub fn catalog(&self) -> Vec<CatalogRule> {
        self.policies.iter().cloned().map(CatalogRule::from).collect()
    }

    pub fn failed_pages(&self) -> usize {
        self.page_errors.len()
    }
}

//! Domain types shared by extraction and compliance checking.
//!
//! Monetary amounts, quantities and dates are opaque strings carried through
//! verbatim: models return them in whatever notation the document uses, and
//! nothing in this crate does arithmetic on them. Only the scope keys
//! (country, seniority, expense type) are ever normalised, and only at
//! comparison time (see [`crate::pipeline::filter`]).

use serde::{Deserialize, Deserializer, Serialize};

/// Lower bound of the confidence range a model may assign to a policy.
pub const MIN_CONFIDENCE: f32 = 0.7;
/// Upper bound of the confidence range a model may assign to a policy.
pub const MAX_CONFIDENCE: f32 = 0.95;

/// Anything scoped by country, seniority and expense type.
///
/// Implemented by both rule shapes so the applicability filter works on
/// freshly extracted policies and on catalog entries alike.
pub trait PolicyScope {
    fn country(&self) -> &str;
    fn seniority(&self) -> &str;
    fn expense_type(&self) -> &str;
}

/// A single expense-policy statement extracted from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    /// Sequential `p<N>` id; empty until the set is finalised.
    #[serde(default)]
    pub id: String,

    /// Verbatim policy statement.
    pub text: String,

    /// Lowercase country name, or `"global"`.
    #[serde(default = "default_country", deserialize_with = "scope_or_default_country")]
    pub country: String,

    /// Category tag (`meals`, `transportation`, ...) or `"all"`.
    #[serde(
        default = "default_expense_type",
        deserialize_with = "scope_or_default_expense_type"
    )]
    pub expense_type: String,

    /// Level tag (`junior`, `senior`, ...) or `"all"`.
    #[serde(default = "default_seniority", deserialize_with = "scope_or_default_seniority")]
    pub seniority: String,

    #[serde(default = "default_confidence", deserialize_with = "lenient_confidence")]
    pub confidence: f32,

    #[serde(default, deserialize_with = "lenient_flag")]
    pub approved: bool,

    /// 1-based page the rule was found on (documents only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
}

impl PolicyRule {
    /// Normalise a rule as it comes out of the reasoner: confidence clamped
    /// into range, not approved, stamped with its page.
    pub fn ingest(mut self, page: Option<usize>) -> Self {
        self.confidence = if self.confidence.is_nan() {
            MIN_CONFIDENCE
        } else {
            self.confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
        };
        self.approved = false;
        self.page = page;
        self
    }
}

impl PolicyScope for PolicyRule {
    fn country(&self) -> &str {
        &self.country
    }
    fn seniority(&self) -> &str {
        &self.seniority
    }
    fn expense_type(&self) -> &str {
        &self.expense_type
    }
}

fn default_country() -> String {
    "global".to_string()
}

fn default_expense_type() -> String {
    "other".to_string()
}

fn default_seniority() -> String {
    "all".to_string()
}

fn default_confidence() -> f32 {
    MIN_CONFIDENCE
}

// Unreadable confidences fall back to the floor; `ingest` clamps the rest.
fn lenient_confidence<'de, D: Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
    use serde_json::Value;

    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64().map_or(MIN_CONFIDENCE, |f| f as f32),
        Value::String(s) => s.trim().parse().unwrap_or(MIN_CONFIDENCE),
        _ => MIN_CONFIDENCE,
    })
}

/// `true`, `"true"` (any case) → true; anything else, `null` included → false.
fn lenient_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    use serde_json::Value;

    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    })
}

// Models sometimes emit `null` for a scope they could not determine.
fn scope_or_default_country<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_else(default_country))
}

fn scope_or_default_expense_type<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_else(default_expense_type))
}

fn scope_or_default_seniority<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_else(default_seniority))
}

/// The `{"policies": [...]}` envelope the extraction prompts ask for.
#[derive(Debug, Deserialize)]
pub(crate) struct PolicyEnvelope {
    #[serde(default)]
    pub policies: Vec<PolicyRule>,
}

/// A policy catalog entry as submitted for a compliance check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRule {
    #[serde(default)]
    pub rule: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub seniority: String,
    #[serde(default)]
    pub expense_type: String,
}

impl PolicyScope for CatalogRule {
    fn country(&self) -> &str {
        &self.country
    }
    fn seniority(&self) -> &str {
        &self.seniority
    }
    fn expense_type(&self) -> &str {
        &self.expense_type
    }
}

impl From<PolicyRule> for CatalogRule {
    fn from(p: PolicyRule) -> Self {
        Self {
            rule: p.text,
            country: p.country,
            seniority: p.seniority,
            expense_type: p.expense_type,
        }
    }
}

/// Fields extracted from a single invoice or receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRecord {
    #[serde(default, deserialize_with = "opaque", skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    /// ISO-8601 date as written by the model.
    #[serde(default, deserialize_with = "opaque", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "opaque", skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "opaque", skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, deserialize_with = "opaque", skip_serializing_if = "Option::is_none")]
    pub expense_type: Option<String>,
    #[serde(default, deserialize_with = "opaque", skip_serializing_if = "Option::is_none")]
    pub expense_location: Option<String>,
    #[serde(default, deserialize_with = "opaque", skip_serializing_if = "Option::is_none")]
    pub expense_country: Option<String>,
    #[serde(default, deserialize_with = "opaque", skip_serializing_if = "Option::is_none")]
    pub number_of_people: Option<String>,
    #[serde(default, deserialize_with = "items_or_empty")]
    pub items: Vec<LineItem>,
    #[serde(default, deserialize_with = "opaque", skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, deserialize_with = "opaque", skip_serializing_if = "Option::is_none")]
    pub taxes: Option<String>,
    #[serde(default, deserialize_with = "opaque", skip_serializing_if = "Option::is_none")]
    pub total: Option<String>,
}

/// One line of an invoice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, deserialize_with = "opaque", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "opaque", skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,
    #[serde(default, deserialize_with = "opaque", skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

/// Accept any JSON scalar as an opaque string; `null` and empty strings become `None`.
fn opaque<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    use serde_json::Value;

    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    })
}

fn items_or_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<LineItem>, D::Error> {
    Ok(Option::<Vec<LineItem>>::deserialize(d)?.unwrap_or_default())
}

/// A single compliance violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(default, deserialize_with = "message_or_empty")]
    pub message: String,
}

impl Violation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

fn message_or_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(opaque(d)?.unwrap_or_default())
}

fn compliance_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    use serde::de::Error;
    use serde_json::Value;

    match Value::deserialize(d)? {
        Value::Bool(b) => Ok(b),
        Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Ok(false),
        other => Err(D::Error::custom(format!("isCompliant must be a boolean, got {other}"))),
    }
}

fn violation_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Violation>, D::Error> {
    use serde::de::Error;
    use serde_json::Value;

    let items = match Value::deserialize(d)? {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        single => vec![single],
    };

    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Null => None,
            Value::String(s) => Some(Ok(Violation::new(s))),
            Value::Object(_) => {
                Some(serde_json::from_value::<Violation>(item).map_err(D::Error::custom))
            }
            other => Some(Ok(Violation::new(other.to_string()))),
        })
        .collect()
}

/// Outcome of checking one invoice against one policy set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceVerdict {
    /// Required. A boolean or the strings `"true"` / `"false"`.
    #[serde(deserialize_with = "compliance_flag")]
    pub is_compliant: bool,
    /// `null` reads as no violations; bare strings read as messages.
    #[serde(default, deserialize_with = "violation_list")]
    pub violations: Vec<Violation>,
}

impl ComplianceVerdict {
    /// A non-compliant verdict carrying a single explanatory violation.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            is_compliant: false,
            violations: vec![Violation::new(message)],
        }
    }
}

/// A compliance check request: invoice fields flattened at the top level,
/// plus the employee seniority and the candidate policy rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceRequest {
    #[serde(default)]
    pub seniority: Option<String>,
    #[serde(default)]
    pub policy_rules: Vec<CatalogRule>,
    #[serde(flatten)]
    pub invoice: InvoiceRecord,
}

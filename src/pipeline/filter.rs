//! Policy applicability filter.
//!
//! A rule applies to an invoice when all three scope axes match. Each axis
//! matches on its wildcard or on the invoice's normalised value:
//!
//! | axis         | wildcard   |
//! |--------------|------------|
//! | country      | `"global"` |
//! | seniority    | `"all"`    |
//! | expense type | `"all"`    |
//!
//! Countries are scoped geographically with `global`; seniority and expense
//! type are scoped organisationally with `all`.

use crate::model::PolicyScope;

pub const GLOBAL_COUNTRY: &str = "global";
pub const ALL: &str = "all";

/// The normalised scope of one invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceScope {
    pub country: String,
    pub seniority: String,
    pub expense_type: String,
}

impl InvoiceScope {
    /// Normalise raw invoice values: lowercase, empty country → `global`,
    /// empty seniority / expense type → `all`, spaces in the expense type → `_`.
    pub fn new(country: Option<&str>, seniority: Option<&str>, expense_type: Option<&str>) -> Self {
        Self {
            country: normalise(country, GLOBAL_COUNTRY),
            seniority: normalise(seniority, ALL),
            expense_type: normalise(expense_type.map(|e| e.replace(' ', "_")).as_deref(), ALL),
        }
    }

    /// Whether `rule` applies to an invoice with this scope.
    pub fn admits<R: PolicyScope + ?Sized>(&self, rule: &R) -> bool {
        axis_matches(rule.country(), GLOBAL_COUNTRY, &self.country)
            && axis_matches(rule.seniority(), ALL, &self.seniority)
            && axis_matches(rule.expense_type(), ALL, &self.expense_type)
    }
}

fn normalise(value: Option<&str>, fallback: &str) -> String {
    match value.map(str::to_lowercase) {
        Some(v) if !v.is_empty() => v,
        _ => fallback.to_string(),
    }
}

fn axis_matches(rule_value: &str, wildcard: &str, invoice_value: &str) -> bool {
    let rule_value = rule_value.to_lowercase();
    rule_value == wildcard || rule_value == invoice_value
}

/// Rules applicable to `scope`, in input order.
pub fn filter_applicable<'a, R: PolicyScope>(rules: &'a [R], scope: &InvoiceScope) -> Vec<&'a R> {
    rules.iter().filter(|rule| scope.admits(*rule)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CatalogRule;

    fn cat(country: &str, seniority: &str, expense_type: &str, text: &str) -> CatalogRule {
        CatalogRule {
            rule: text.into(),
            country: country.into(),
            seniority: seniority.into(),
            expense_type: expense_type.into(),
        }
    }

    #[test]
    fn global_meal_rule_applies_to_junior_in_france() {
        let rules = vec![cat("global", "all", "meals", "Meals capped at $50")];
        let scope = InvoiceScope::new(Some("france"), Some("junior"), Some("meals"));
        assert_eq!(filter_applicable(&rules, &scope).len(), 1);
    }

    #[test]
    fn each_axis_must_match() {
        let scope = InvoiceScope::new(Some("France"), Some("Senior"), Some("Meals"));
        let rules = vec![
            cat("germany", "all", "all", "wrong country"),
            cat("global", "junior", "all", "wrong seniority"),
            cat("global", "all", "accommodation", "wrong expense type"),
            cat("France", "SENIOR", "meals", "exact on every axis"),
            cat("global", "all", "all", "wildcards everywhere"),
        ];
        let texts: Vec<&str> = filter_applicable(&rules, &scope)
            .into_iter()
            .map(|r| r.rule.as_str())
            .collect();
        assert_eq!(texts, vec!["exact on every axis", "wildcards everywhere"]);
    }

    #[test]
    fn wildcards_are_axis_specific() {
        let scope = InvoiceScope::new(Some("japan"), Some("junior"), Some("meals"));
        // "all" is not a country wildcard and "global" is not a seniority wildcard.
        assert!(!scope.admits(&cat("all", "all", "all", "")));
        assert!(!scope.admits(&cat("global", "global", "all", "")));
        assert!(!scope.admits(&cat("global", "all", "global", "")));
    }

    #[test]
    fn missing_invoice_values_fall_back_to_wildcards() {
        let scope = InvoiceScope::new(None, Some(""), None);
        assert_eq!(scope.country, "global");
        assert_eq!(scope.seniority, "all");
        assert_eq!(scope.expense_type, "all");

        let rules = vec![
            cat("global", "all", "all", "applies"),
            cat("france", "all", "all", "country-specific"),
            cat("global", "senior", "all", "seniority-specific"),
        ];
        let hits = filter_applicable(&rules, &scope);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rule, "applies");
    }

    #[test]
    fn expense_type_spaces_become_underscores() {
        let scope = InvoiceScope::new(Some("india"), None, Some("Office Supplies"));
        assert_eq!(scope.expense_type, "office_supplies");
        assert!(scope.admits(&cat("india", "all", "office_supplies", "")));
    }

    #[test]
    fn rules_missing_scope_fields_never_match() {
        let scope = InvoiceScope::new(Some("france"), Some("junior"), Some("meals"));
        let rule = CatalogRule {
            rule: "no scope".into(),
            ..Default::default()
        };
        assert!(!scope.admits(&rule));
    }

    #[test]
    fn result_is_an_ordered_subset() {
        let rules = vec![
            cat("global", "all", "all", "1"),
            cat("spain", "all", "all", "2"),
            cat("global", "all", "meals", "3"),
            cat("global", "all", "all", "4"),
        ];
        let scope = InvoiceScope::new(Some("italy"), None, Some("meals"));
        let hits: Vec<&str> = filter_applicable(&rules, &scope)
            .into_iter()
            .map(|r| r.rule.as_str())
            .collect();
        assert_eq!(hits, vec!["1", "3", "4"]);
    }
}

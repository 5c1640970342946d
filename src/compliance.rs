//! Compliance evaluation: judge one invoice against the applicable rules.
//!
//! The evaluator filters the catalog down to the rules whose scope admits
//! the invoice, renders them with the invoice into one prompt, makes a
//! single reasoner call and recovers the verdict from the reply.
//!
//! Checking never fails. Every error, including failing to construct a
//! reasoner, becomes a non-compliant verdict whose only violation carries
//! the error message, so callers always have something to show the user.

use crate::config::ExpenseConfig;
use crate::error::ExpenseError;
use crate::model::{CatalogRule, ComplianceRequest, ComplianceVerdict, InvoiceRecord};
use crate::pipeline::filter::{filter_applicable, InvoiceScope};
use crate::pipeline::recover::recover_as;
use crate::prompts::{compliance_prompt, render_policies, NO_VALID_VERDICT};
use crate::reasoner::{resolve_reasoner, Reasoner, ReasonerRequest};
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Evaluates invoices against policy catalogs with one reasoner.
#[derive(Clone)]
pub struct ComplianceEvaluator {
    reasoner: Arc<dyn Reasoner>,
    max_tokens: usize,
    temperature: f32,
    today: Option<NaiveDate>,
}

impl ComplianceEvaluator {
    pub fn new(reasoner: Arc<dyn Reasoner>, config: &ExpenseConfig) -> Self {
        Self {
            reasoner,
            max_tokens: config.compliance_max_tokens,
            temperature: config.temperature,
            today: None,
        }
    }

    /// Pin the date the reasoner is told is today. Defaults to the local date
    /// at each evaluation.
    pub fn with_date(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Judge `invoice` against the rules in `catalog` that apply to it.
    pub async fn evaluate(
        &self,
        seniority: Option<&str>,
        invoice: &InvoiceRecord,
        catalog: &[CatalogRule],
    ) -> ComplianceVerdict {
        match self.try_evaluate(seniority, invoice, catalog).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("Compliance check failed: {}", e);
                ComplianceVerdict::rejected(format!("Error checking policy compliance: {e}"))
            }
        }
    }

    async fn try_evaluate(
        &self,
        seniority: Option<&str>,
        invoice: &InvoiceRecord,
        catalog: &[CatalogRule],
    ) -> Result<ComplianceVerdict, ExpenseError> {
        let scope = InvoiceScope::new(
            invoice.expense_country.as_deref(),
            seniority,
            invoice.expense_type.as_deref(),
        );
        let applicable = filter_applicable(catalog, &scope);
        info!(
            "Applying {} applicable policies out of {} total",
            applicable.len(),
            catalog.len()
        );
        debug!(
            "Invoice scope: country={}, expense_type={}, seniority={}",
            scope.country, scope.expense_type, scope.seniority
        );

        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        let prompt = compliance_prompt(
            &today.format("%Y-%m-%d").to_string(),
            &render_policies(&applicable),
            invoice,
            seniority,
        );

        let request = ReasonerRequest::text(prompt, self.max_tokens, self.temperature);
        let reply = self.reasoner.complete(&request).await?;

        match recover_as::<ComplianceVerdict>(&reply, "compliance") {
            Ok(verdict) => {
                info!(
                    "Verdict: compliant={}, {} violations",
                    verdict.is_compliant,
                    verdict.violations.len()
                );
                Ok(verdict)
            }
            Err(e) => {
                warn!("{}", e);
                Ok(ComplianceVerdict::rejected(NO_VALID_VERDICT))
            }
        }
    }
}

/// Check one invoice against a policy catalog.
///
/// Never returns an error: failures become a non-compliant verdict.
pub async fn check_policy_compliance(
    seniority: Option<&str>,
    invoice: &InvoiceRecord,
    rules: &[CatalogRule],
    config: &ExpenseConfig,
) -> ComplianceVerdict {
    match resolve_reasoner(config) {
        Ok(reasoner) => {
            ComplianceEvaluator::new(reasoner, config)
                .evaluate(seniority, invoice, rules)
                .await
        }
        Err(e) => {
            warn!("Compliance check failed: {}", e);
            ComplianceVerdict::rejected(format!("Error checking policy compliance: {e}"))
        }
    }
}

/// [`check_policy_compliance`] for a boundary-shaped request.
pub async fn check_request(request: &ComplianceRequest, config: &ExpenseConfig) -> ComplianceVerdict {
    check_policy_compliance(
        request.seniority.as_deref(),
        &request.invoice,
        &request.policy_rules,
        config,
    )
    .await
}

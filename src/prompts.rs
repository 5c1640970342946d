//! Prompts sent to the external reasoner, and the renderers that fill them.
//!
//! Every prompt lives here so wording changes happen in one place and unit
//! tests can inspect the exact text without calling a model.
//!
//! The extraction prompts ask for a bare JSON object; replies are still run
//! through [`crate::pipeline::recover`] because models do not always comply.

use crate::model::{CatalogRule, InvoiceRecord, LineItem};
use std::fmt::Write as _;

// ── Policy extraction ────────────────────────────────────────────────────

/// Shared body of both policy extraction prompts.
macro_rules! policy_instructions {
    () => {
        r#"For each policy rule you identify:
1. Extract the exact text of the policy rule
2. Determine which country it applies to (global if it applies to all countries)
3. Determine which expense type it applies to (meals, transportation, accommodation, etc.)
4. Determine which seniority level it applies to (all, junior, mid-level, senior, executive)

Look for policy statements containing keywords like:
- must, should, required, not allowed, prohibited
- approval, limit, maximum, minimum
- expense, receipt, reimbursement
- specific monetary amounts and currency symbols

Return the extracted policies in exactly this JSON format with no additional text:
{
  "policies": [
    {
      "id": "p1",
      "text": "<exact policy text>",
      "country": "<country name or 'global'>",
      "expenseType": "<expense type>",
      "seniority": "<seniority level or 'all'>",
      "confidence": 0.95,
      "approved": false
    }
  ]
}

Valid expense types (use the most appropriate one):
- meals
- transportation
- accommodation
- entertainment
- mobile
- office_supplies
- software
- hardware
- conferences
- training
- other

Valid countries (use lowercase, or 'global' if applies everywhere):
- global
- united states
- united kingdom
- germany
- france
- japan
- canada
- australia
- brazil
- india
- china
- singapore
- south korea
- mexico
- spain
- italy
- netherlands

Valid seniority levels (use the most appropriate one):
- all
- junior
- mid-level
- senior
- executive

Important:
- Extract complete policy rules with their full context
- Make sure each rule is distinct (don't duplicate rules)
- If a specific country/expense type/seniority isn't mentioned, use 'global'/'other'/'all' respectively
- Assign an appropriate confidence score between 0.7 and 0.95 based on how clearly stated the policy is
- Use the id format "p1", "p2", etc.
- Set approved to false for all extracted policies"#
    };
}

/// Prompt sent with each rendered page of a policy document.
pub const POLICY_EXTRACTION_PROMPT: &str = concat!(
    "You are a specialized AI for extracting expense policy rules from corporate documents.\n",
    "Please carefully analyze this document and extract all expense policy rules.\n\n",
    policy_instructions!()
);

/// Prompt for extracting policies from plain text (pasted or fetched from a URL).
pub fn policy_extraction_prompt_for_text(text: &str) -> String {
    format!(
        "You are a specialized AI for extracting expense policy rules from text content.\n\
         Please carefully analyze this text and extract all expense policy rules.\n\n\
         TEXT CONTENT TO ANALYZE:\n{}\n\n{}",
        text,
        policy_instructions!()
    )
}

/// Marker appended to text cut at the configured length limit.
pub const TRUNCATION_MARKER: &str = "... [Content truncated]";

// ── Invoice extraction ───────────────────────────────────────────────────

/// Prompt sent with an invoice or receipt image.
pub const INVOICE_EXTRACTION_PROMPT: &str = r#"Please extract the following information from this invoice image and organize them into a structured format:
1. Invoice details:
   - Invoice number
   - Invoice date
   - Currency
   - Vendor/Company name
   - Expense Type (Meals /Hotel/ Conveyance /Mobile etc. )
   - Expense location (City or Town)
   - Expense country (Country of expense)
   - Number of people (only if this is a food/meal/restaurant bill)
     Note: The number of people might be labeled in various ways such as "Covers", "Guests", "PAX", "Diners",
     "Party size", "Table of X", "Persons", "People", "No. of persons", "Customers", etc.

2. Line items - for each item provide:
  - Item description
  - Quantity
  - Amount

3. Financial summary:
   - Subtotal
   - Tax amount
   - Total amount

Return the data in this exact JSON format, with no additional text or notes:
{
  "invoiceNumber": "<invoice number>",
  "date": "<date in YYYY-MM-DD format>",
  "currency": "<currency code>",
  "vendor": "<vendor name>",
  "expenseType": "<expense type>",
  "expenseLocation": "<expense location>",
  "expenseCountry": "<expense country>",
  "numberOfPeople": "<number of people if this is a food/meal/restaurant bill, otherwise null>",

  "items": [
    {
      "description": "<item description>",
      "quantity": "<item quantity>",
      "amount": "<amount without currency symbol>"
    }
  ],
  "amount": "<subtotal without currency symbol>",
  "taxes": "<tax amount without currency symbol>",
  "total": "<total amount without currency symbol>"
}

Do not include any markdown formatting, code block indicators, or additional text. Provide only the raw JSON object"#;

// ── Compliance ───────────────────────────────────────────────────────────

const NOT_PROVIDED: &str = "Not provided";

/// Rendered when no catalog rule applies to the invoice.
pub const DEFAULT_POLICY: &str = "1. POLICY: Invoice must have valid information and comply with general expense guidelines.\n   \
APPLIES TO: All countries\n   \
EMPLOYEE LEVEL: All employee levels\n   \
EXPENSE TYPE: All expense categories";

/// Failure message when the compliance reply holds no JSON object, or one
/// that cannot be read as a verdict (for example without `isCompliant`).
pub const NO_VALID_VERDICT: &str = "Failed to get valid response from policy checker";

fn or_placeholder(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(NOT_PROVIDED)
}

fn render_line_items(items: &[LineItem]) -> String {
    if items.is_empty() {
        return "No items found".to_string();
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                "{}. Description: {}\n   Quantity: {}\n   Amount: {}",
                i + 1,
                or_placeholder(&item.description),
                or_placeholder(&item.quantity),
                or_placeholder(&item.amount)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Human-readable invoice description for the compliance prompt.
pub fn render_invoice(invoice: &InvoiceRecord, seniority: Option<&str>) -> String {
    let mut out = String::from("Invoice Details:\n");
    let fields = [
        ("Invoice Number", or_placeholder(&invoice.invoice_number)),
        ("Invoice Date", or_placeholder(&invoice.date)),
        ("Vendor", or_placeholder(&invoice.vendor)),
        ("Currency", or_placeholder(&invoice.currency)),
        ("Total Amount", or_placeholder(&invoice.total)),
        ("Expense location", or_placeholder(&invoice.expense_location)),
        ("Expense country", or_placeholder(&invoice.expense_country)),
        ("Expense type", or_placeholder(&invoice.expense_type)),
        ("Employee Seniority", seniority.filter(|s| !s.is_empty()).unwrap_or(NOT_PROVIDED)),
        ("No. of people", invoice.number_of_people.as_deref().unwrap_or("1")),
    ];
    for (label, value) in fields {
        let _ = writeln!(out, "- {label}: {value}");
    }
    let _ = write!(out, "\nLine Items:\n{}", render_line_items(&invoice.items));
    out
}

fn describe_scope(value: &str, wildcard: &str, everyone: &str, suffix: &str) -> String {
    if value.eq_ignore_ascii_case(wildcard) {
        everyone.to_string()
    } else if suffix.is_empty() {
        value.to_string()
    } else {
        format!("{value} {suffix}")
    }
}

/// Numbered, scope-annotated list of applicable rules.
///
/// Falls back to [`DEFAULT_POLICY`] when `rules` is empty.
pub fn render_policies(rules: &[&CatalogRule]) -> String {
    if rules.is_empty() {
        return DEFAULT_POLICY.to_string();
    }

    rules
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{}. POLICY: {}\n   APPLIES TO: {}\n   EMPLOYEE LEVEL: {}\n   EXPENSE TYPE: {}",
                i + 1,
                r.rule,
                describe_scope(&r.country, "global", "All countries", ""),
                describe_scope(&r.seniority, "all", "All employee levels", "level employees"),
                describe_scope(&r.expense_type, "all", "All expense categories", "expenses"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The full compliance request.
///
/// `today` is an ISO date (`YYYY-MM-DD`); `policies` is the output of
/// [`render_policies`].
pub fn compliance_prompt(
    today: &str,
    policies: &str,
    invoice: &InvoiceRecord,
    seniority: Option<&str>,
) -> String {
    let invoice_text = render_invoice(invoice, seniority);
    let seniority = seniority.filter(|s| !s.is_empty()).unwrap_or(NOT_PROVIDED);
    let invoice_date = or_placeholder(&invoice.date);

    format!(
        r#"You are an expense policy compliance checker. Your task is to check if this invoice complies with company policies.

Current date is {today}

EXPENSE POLICIES:
{policies}

INVOICE TO CHECK:
{invoice_text}

Employee Seniority:
{seniority}

IMPORTANT RULES TO ALWAYS CHECK:
1. Verify that the invoice has a valid invoice number
2. Check that the vendor name is provided
3. Ensure the expense date is not in the future
4. Check that the expense date complies with all timeframe policies (including maximum age of expenses)
5. Verify that all required fields are properly filled out

IMPORTANT: You must respond ONLY with a JSON object in this exact format:
{{
    "isCompliant": boolean,
    "violations": [
        {{"message": "violation description"}}
    ]
}}

Rules for your response:
1. Only output valid JSON. No additional text before or after.
2. If there are no violations, return an empty violations array.
3. Do not include explanations or notes outside the JSON.
4. Keep violation messages clear and concise.
5. Date validation instructions:
   - Today's date is {today}
   - Invoice date is {invoice_date}
   - You must calculate the difference in days between the invoice date and today's date
   - Flag any violation of maximum timeframe policies (such as expenses being too old)

CRITICAL INSTRUCTIONS FOR POLICY ENFORCEMENT:
- Country-specific policies ONLY apply to expenses from the specified country
- Global policies apply to all expenses regardless of country
- DO NOT apply country-specific rules from one country to invoices from a different country

Check the invoice against each policy and include any violations in the JSON response."#
    )
}

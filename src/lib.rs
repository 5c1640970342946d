//! # expensepal
//!
//! Extract expense data and policy rules from documents with an LLM, then
//! check invoices against the rules that apply to them.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Policy PDF / text / URL
//!  │
//!  ├─ 1. Input    validate local file or fetch URL (size-capped)
//!  ├─ 2. Render   rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Pages    concurrent vision calls, one per page (bounded)
//!  ├─ 4. Recover  pull JSON out of each reply
//!  └─ 5. Dedup    drop repeated rules, assign ids p1..pN
//!
//! Invoice PDF / image ──▶ vision call ──▶ InvoiceRecord
//!
//! InvoiceRecord + rules ──▶ scope filter ──▶ compliance call ──▶ verdict
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use expensepal::{
//!     check_policy_compliance, extract_invoice, extract_policies_from_pdf, ExpenseConfig,
//!     FileKind,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from ANTHROPIC_API_KEY / OPENAI_API_KEY / …
//!     let config = ExpenseConfig::default();
//!
//!     let policies = extract_policies_from_pdf("travel-policy.pdf", &config).await?;
//!     let invoice = extract_invoice("dinner.jpg", FileKind::Image, &config).await?;
//!
//!     let verdict =
//!         check_policy_compliance(Some("junior"), &invoice, &policies.catalog(), &config).await;
//!     println!("compliant: {}", verdict.is_compliant);
//!     for v in &verdict.violations {
//!         println!("  - {}", v.message);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `expensepal` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! expensepal = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod compliance;
pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod reasoner;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use compliance::{check_policy_compliance, check_request, ComplianceEvaluator};
pub use config::{ExpenseConfig, ExpenseConfigBuilder};
pub use error::{ExpenseError, PageError, ReasonerError};
pub use extract::{
    extract_invoice, extract_invoice_page, extract_policies, extract_policies_from_pdf,
    extract_policies_from_text, extract_policies_from_url,
};
pub use model::{
    CatalogRule, ComplianceRequest, ComplianceVerdict, InvoiceRecord, LineItem, PolicyRule,
    Violation,
};
pub use output::PolicyExtraction;
pub use pipeline::input::FileKind;
pub use pipeline::pages::PageOutcome;
pub use pipeline::render::{PageImage, Rasterizer, RenderOptions, RenderedPages};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use reasoner::{LlmReasoner, Reasoner, ReasonerRequest};
pub use stream::{extract_policies_stream, PageOutcomeStream};

//! Integration tests for the extraction and compliance pipelines.
//!
//! The reasoner and the rasteriser are replaced by in-process fakes, so these
//! run without pdfium or network access. Fake page images are 1 pixel high
//! and `page_num` pixels wide; the fake reasoner reads the width back to know
//! which page it was sent.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::NaiveDate;
use expensepal::{
    check_request, extract_invoice, extract_invoice_page, extract_policies,
    extract_policies_from_pdf, extract_policies_from_text, extract_policies_stream, CatalogRule,
    ComplianceEvaluator, ComplianceRequest, ExpenseConfig, ExpenseError, FileKind, InvoiceRecord,
    PageError, PageImage, PageOutcome, Rasterizer, Reasoner, ReasonerError, ReasonerRequest,
    RenderOptions, RenderedPages,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Replies to vision calls by page (image width) and to text calls with a
/// fixed answer. Records every prompt it receives.
#[derive(Default)]
struct FakeReasoner {
    pages: HashMap<usize, Result<String, ReasonerError>>,
    text_reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeReasoner {
    fn page(mut self, page: usize, reply: &str) -> Self {
        self.pages.insert(page, Ok(reply.to_string()));
        self
    }

    fn failing_page(mut self, page: usize, detail: &str) -> Self {
        self.pages.insert(
            page,
            Err(ReasonerError::Api {
                model: "fake".into(),
                detail: detail.into(),
            }),
        );
        self
    }

    fn text(mut self, reply: &str) -> Self {
        self.text_reply = Some(reply.to_string());
        self
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reasoner for FakeReasoner {
    async fn complete(&self, request: &ReasonerRequest) -> Result<String, ReasonerError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        tokio::task::yield_now().await;

        match &request.image {
            Some(image) => {
                let bytes = STANDARD.decode(&image.data).unwrap();
                let page = image::load_from_memory(&bytes).unwrap().width() as usize;
                self.pages
                    .get(&page)
                    .cloned()
                    .unwrap_or_else(|| Ok(r#"{"policies": []}"#.to_string()))
            }
            None => Ok(self.text_reply.clone().unwrap_or_default()),
        }
    }
}

/// Writes `pages` PNGs into a fresh temp dir, ignoring the PDF contents.
struct FakeRasterizer {
    pages: usize,
}

impl Rasterizer for FakeRasterizer {
    fn rasterize(&self, _pdf: &Path, options: &RenderOptions) -> Result<RenderedPages, ExpenseError> {
        assert_eq!(options.dpi, 300);
        let dir = TempDir::new().map_err(|e| ExpenseError::Internal(e.to_string()))?;
        let images = (1..=self.pages)
            .map(|n| {
                let path = dir.path().join(format!("page_{n}.png"));
                image::RgbImage::new(n as u32, 1).save(&path).unwrap();
                PageImage { page_num: n, path }
            })
            .collect();
        Ok(RenderedPages::new(dir, images))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn config(reasoner: Arc<FakeReasoner>, pages: usize) -> ExpenseConfig {
    ExpenseConfig::builder()
        .reasoner(reasoner)
        .rasterizer(Arc::new(FakeRasterizer { pages }))
        .concurrency(4)
        .build()
        .unwrap()
}

/// A file that passes the `%PDF` magic check.
fn fake_pdf(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("policy.pdf");
    std::fs::write(&path, b"%PDF-1.7\n%fake\n").unwrap();
    path
}

/// Serve one HTTP response on a random local port and return its URL.
async fn serve_once(content_type: &'static str, body: &'static str) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });
    format!("http://{addr}/policy")
}

const PAGE_ONE: &str = r#"Here are the rules:
```json
{"policies": [
  {"text": "Meals are capped at $50 per person.", "country": "global", "expenseType": "meals", "seniority": "all", "confidence": 0.99},
  {"text": "Taxi rides require a receipt.", "country": "france", "expenseType": "transport", "confidence": 0.1}
]}
```"#;

// ── Policies from PDF ────────────────────────────────────────────────────────

#[tokio::test]
async fn pdf_pages_merge_with_failed_pages_recorded() {
    let dir = TempDir::new().unwrap();
    let pdf = fake_pdf(&dir);
    let reasoner = Arc::new(
        FakeReasoner::default()
            .page(1, PAGE_ONE)
            .failing_page(2, "upstream 500")
            .page(3, r#"{"policies": []}"#),
    );

    let out = extract_policies_from_pdf(&pdf, &config(reasoner, 3))
        .await
        .unwrap();

    assert_eq!(out.page_count, Some(3));
    assert_eq!(out.policies.len(), 2);
    assert_eq!(out.policies[0].id, "p1");
    assert_eq!(out.policies[1].id, "p2");
    assert!(out.policies.iter().all(|p| p.page == Some(1) && !p.approved));
    assert_eq!(out.policies[0].confidence, 0.95);
    assert_eq!(out.policies[1].confidence, 0.7);

    assert_eq!(out.failed_pages(), 1);
    assert!(matches!(out.page_errors[0], PageError::ReasonerFailed { page: 2, .. }));
}

#[tokio::test]
async fn rules_repeated_across_pages_are_kept_once() {
    let dir = TempDir::new().unwrap();
    let pdf = fake_pdf(&dir);
    let reasoner = Arc::new(
        FakeReasoner::default()
            .page(1, r#"{"policies": [{"text": "Meals are capped at $50 per person."}]}"#)
            .page(
                2,
                r#"{"policies": [{"text": "MEALS are capped at 50 per person"},
                                 {"text": "Hotels must be booked through the travel desk."}]}"#,
            )
            .page(3, r#"{"policies": [{"text": "meals are capped at $50, per person"}]}"#),
    );

    let out = extract_policies_from_pdf(&pdf, &config(reasoner, 3))
        .await
        .unwrap();

    assert_eq!(out.policies.len(), 2);
    let ids: Vec<_> = out.policies.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["p1", "p2"]);
    assert!(out.page_errors.is_empty());
}

#[tokio::test]
async fn extract_policies_dispatches_local_paths_to_the_pdf_path() {
    let dir = TempDir::new().unwrap();
    let pdf = fake_pdf(&dir);
    let reasoner = Arc::new(FakeReasoner::default().page(1, PAGE_ONE));

    let out = extract_policies(pdf.to_str().unwrap(), &config(reasoner, 1))
        .await
        .unwrap();
    assert_eq!(out.policies.len(), 2);
    assert_eq!(out.page_count, Some(1));
}

#[tokio::test]
async fn non_pdf_file_is_rejected_before_rendering() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.pdf");
    std::fs::write(&path, b"just text").unwrap();
    let reasoner = Arc::new(FakeReasoner::default());

    let err = extract_policies_from_pdf(&path, &config(reasoner.clone(), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ExpenseError::NotAPdf { .. }));
    assert!(reasoner.prompts().is_empty());
}

#[tokio::test]
async fn missing_file_is_reported() {
    let reasoner = Arc::new(FakeReasoner::default());
    let err = extract_policies_from_pdf("/no/such/policy.pdf", &config(reasoner, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ExpenseError::FileNotFound { .. }));
}

// ── Policies from text and URLs ──────────────────────────────────────────────

#[tokio::test]
async fn long_text_is_truncated_before_the_call() {
    let reasoner = Arc::new(
        FakeReasoner::default().text(r#"{"policies": [{"text": "Receipts are required."}]}"#),
    );
    let config = ExpenseConfig::builder()
        .reasoner(reasoner.clone())
        .max_text_chars(10)
        .build()
        .unwrap();

    let text = "abcdefghij".repeat(5);
    let out = extract_policies_from_text(&text, &config).await.unwrap();

    assert_eq!(out.policies.len(), 1);
    assert_eq!(out.policies[0].id, "p1");
    assert_eq!(out.policies[0].page, None);
    assert_eq!(out.page_count, None);

    let prompts = reasoner.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("abcdefghij... [Content truncated]"));
    assert!(!prompts[0].contains("abcdefghijabcdefghij"));
}

#[tokio::test]
async fn text_reply_without_json_yields_no_policies() {
    let reasoner = Arc::new(FakeReasoner::default().text("I could not find any policies."));
    let config = ExpenseConfig::builder().reasoner(reasoner).build().unwrap();

    let out = extract_policies_from_text("Employees may travel.", &config)
        .await
        .unwrap();
    assert!(out.policies.is_empty());
}

#[tokio::test]
async fn text_rules_with_loose_fields_are_kept() {
    let reasoner = Arc::new(FakeReasoner::default().text(
        r#"{"policies": [{"text": "Receipts are required.", "confidence": null},
                         {"text": "Taxis need approval.", "confidence": "0.8", "approved": null}]}"#,
    ));
    let config = ExpenseConfig::builder().reasoner(reasoner).build().unwrap();

    let out = extract_policies_from_text("Travel policy", &config).await.unwrap();
    assert_eq!(out.policies.len(), 2);
    assert_eq!(out.policies[0].confidence, 0.7);
    assert_eq!(out.policies[1].confidence, 0.8);
}

#[tokio::test]
async fn html_pages_are_reduced_to_text() {
    let url = serve_once(
        "text/html; charset=utf-8",
        "<html><head><style>p { color: red }</style><script>var x = 1;</script></head>\
         <body><h1>Travel policy</h1><p>Meals are capped at &pound;40 &amp; require receipts.</p></body></html>",
    )
    .await;
    let reasoner = Arc::new(
        FakeReasoner::default().text(r#"{"policies": [{"text": "Meals are capped at £40."}]}"#),
    );
    let config = ExpenseConfig::builder().reasoner(reasoner.clone()).build().unwrap();

    let out = extract_policies(&url, &config).await.unwrap();
    assert_eq!(out.policies.len(), 1);

    let prompt = &reasoner.prompts()[0];
    assert!(prompt.contains("Travel policy"));
    assert!(prompt.contains("require receipts"));
    assert!(!prompt.contains("<p>"));
    assert!(!prompt.contains("var x"));
}

// ── Invoices ─────────────────────────────────────────────────────────────────

const INVOICE_REPLY: &str = r#"{"invoiceNumber": "INV-7", "date": "2025-02-14", "vendor": "Chez Paul",
    "currency": "EUR", "expenseType": "meals", "expenseCountry": "France", "numberOfPeople": 2,
    "items": [{"description": "Menu", "quantity": 2, "amount": "45.00"}], "total": 90.0}"#;

#[tokio::test]
async fn invoice_from_image() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("receipt.png");
    image::RgbImage::new(1, 1).save(&path).unwrap();

    let reasoner = Arc::new(FakeReasoner::default().page(1, INVOICE_REPLY));
    let invoice = extract_invoice(&path, FileKind::Image, &config(reasoner, 0))
        .await
        .unwrap();

    assert_eq!(invoice.invoice_number.as_deref(), Some("INV-7"));
    assert_eq!(invoice.number_of_people.as_deref(), Some("2"));
    assert_eq!(invoice.total.as_deref(), Some("90.0"));
    assert_eq!(invoice.items.len(), 1);
    assert_eq!(invoice.items[0].quantity.as_deref(), Some("2"));
}

#[tokio::test]
async fn invoice_from_a_chosen_pdf_page() {
    let dir = TempDir::new().unwrap();
    let pdf = fake_pdf(&dir);
    let reasoner = Arc::new(
        FakeReasoner::default()
            .page(1, r#"{"invoiceNumber": "COVER"}"#)
            .page(2, INVOICE_REPLY),
    );
    let config = config(reasoner, 3);

    let first = extract_invoice(&pdf, FileKind::Pdf, &config).await.unwrap();
    assert_eq!(first.invoice_number.as_deref(), Some("COVER"));

    let second = extract_invoice_page(&pdf, FileKind::Pdf, 1, &config)
        .await
        .unwrap();
    assert_eq!(second.vendor.as_deref(), Some("Chez Paul"));

    let err = extract_invoice_page(&pdf, FileKind::Pdf, 5, &config)
        .await
        .unwrap_err();
    assert!(matches!(err, ExpenseError::PageOutOfRange { page: 6, total: 3 }));
}

#[tokio::test]
async fn invoice_reply_without_json_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("receipt.png");
    image::RgbImage::new(1, 1).save(&path).unwrap();

    let reasoner = Arc::new(FakeReasoner::default().page(1, "This is not an invoice."));
    let err = extract_invoice(&path, FileKind::Image, &config(reasoner, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, ExpenseError::NoValidJson { .. }));
}

#[tokio::test]
async fn unsupported_image_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("receipt.gif");
    std::fs::write(&path, b"GIF89a......").unwrap();

    let reasoner = Arc::new(FakeReasoner::default());
    let err = extract_invoice(&path, FileKind::Image, &config(reasoner.clone(), 0))
        .await
        .unwrap_err();
    assert!(matches!(err, ExpenseError::UnsupportedImage { .. }));
    assert!(reasoner.prompts().is_empty());
}

// ── Compliance ───────────────────────────────────────────────────────────────

fn catalog() -> Vec<CatalogRule> {
    let rule = |rule: &str, country: &str, seniority: &str, expense_type: &str| CatalogRule {
        rule: rule.into(),
        country: country.into(),
        seniority: seniority.into(),
        expense_type: expense_type.into(),
    };
    vec![
        rule("Meals are capped at 40 EUR per person.", "france", "all", "meals"),
        rule("Hotels are capped at 150 EUR per night.", "global", "all", "accommodation"),
        rule("Executives may fly business class.", "global", "executive", "all"),
        rule("Receipts are required for all expenses.", "global", "all", "all"),
    ]
}

fn dinner() -> InvoiceRecord {
    serde_json::from_str(INVOICE_REPLY).unwrap()
}

#[tokio::test]
async fn compliance_sends_only_applicable_rules() {
    let reasoner = Arc::new(FakeReasoner::default().text(
        r#"```json
{"isCompliant": false, "violations": [{"message": "Meal exceeds 40 EUR per person"}]}
```"#,
    ));
    let config = ExpenseConfig::builder().reasoner(reasoner.clone()).build().unwrap();

    let verdict = ComplianceEvaluator::new(reasoner.clone(), &config)
        .with_date(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())
        .evaluate(Some("junior"), &dinner(), &catalog())
        .await;

    assert!(!verdict.is_compliant);
    assert_eq!(verdict.violations[0].message, "Meal exceeds 40 EUR per person");

    let prompt = &reasoner.prompts()[0];
    assert!(prompt.contains("Current date is 2025-03-01"));
    assert!(prompt.contains("Meals are capped at 40 EUR"));
    assert!(prompt.contains("Receipts are required"));
    assert!(!prompt.contains("Hotels are capped"));
    assert!(!prompt.contains("business class"));
    assert!(prompt.contains("- No. of people: 2"));
}

#[tokio::test]
async fn unparseable_verdict_is_non_compliant() {
    let reasoner = Arc::new(FakeReasoner::default().text("Looks fine to me!"));
    let config = ExpenseConfig::builder().reasoner(reasoner).build().unwrap();

    let request = ComplianceRequest {
        seniority: Some("senior".into()),
        policy_rules: catalog(),
        invoice: dinner(),
    };
    let verdict = check_request(&request, &config).await;

    assert!(!verdict.is_compliant);
    assert_eq!(
        verdict.violations[0].message,
        "Failed to get valid response from policy checker"
    );
}

#[tokio::test]
async fn request_json_flattens_invoice_fields() {
    let request: ComplianceRequest = serde_json::from_str(
        r#"{"invoiceNumber": "INV-9", "vendor": "Hotel Lux", "expenseType": "accommodation",
            "seniority": "mid-level",
            "policyRules": [{"rule": "Hotels are capped at 150 EUR per night.", "country": "global",
                             "seniority": "all", "expenseType": "accommodation"}]}"#,
    )
    .unwrap();
    assert_eq!(request.invoice.invoice_number.as_deref(), Some("INV-9"));
    assert_eq!(request.policy_rules.len(), 1);

    let reasoner = Arc::new(
        FakeReasoner::default().text(r#"{"isCompliant": true, "violations": []}"#),
    );
    let config = ExpenseConfig::builder().reasoner(reasoner.clone()).build().unwrap();
    let verdict = check_request(&request, &config).await;

    assert!(verdict.is_compliant);
    assert!(verdict.violations.is_empty());
    assert!(reasoner.prompts()[0].contains("Hotels are capped"));
}

// ── Streaming ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_yields_one_outcome_per_page() {
    let dir = TempDir::new().unwrap();
    let pdf = fake_pdf(&dir);
    let reasoner = Arc::new(
        FakeReasoner::default()
            .page(1, PAGE_ONE)
            .page(2, "no json here")
            .page(3, PAGE_ONE),
    );

    let stream = extract_policies_stream(&pdf, &config(reasoner, 3))
        .await
        .unwrap();
    let mut outcomes: Vec<PageOutcome> = stream.collect().await;
    outcomes.sort_by_key(PageOutcome::page);

    assert_eq!(outcomes.len(), 3);
    match &outcomes[0] {
        PageOutcome::Extracted { page, policies } => {
            assert_eq!(*page, 1);
            assert_eq!(policies.len(), 2);
            assert!(policies.iter().all(|p| p.id.is_empty()));
        }
        other => panic!("expected page 1 to succeed, got {other:?}"),
    }
    assert_eq!(
        outcomes[1],
        PageOutcome::Failed(PageError::NoValidJson { page: 2 })
    );
    assert!(matches!(outcomes[2], PageOutcome::Extracted { page: 3, .. }));
}

//! Extraction entry points: invoices from PDFs or images, policies from
//! PDFs, text or URLs.
//!
//! Policy documents go through the parallel page processor and come back
//! deduplicated with sequential ids. Use [`crate::stream::extract_policies_stream`]
//! instead to observe raw per-page outcomes as they complete.

use crate::config::ExpenseConfig;
use crate::error::ExpenseError;
use crate::model::{InvoiceRecord, PolicyEnvelope, PolicyRule};
use crate::output::PolicyExtraction;
use crate::pipeline::input::{self, FileKind};
use crate::pipeline::pages::PageProcessor;
use crate::pipeline::recover::recover_as;
use crate::pipeline::{dedup, encode, render, webtext};
use crate::prompts::{
    policy_extraction_prompt_for_text, INVOICE_EXTRACTION_PROMPT, TRUNCATION_MARKER,
};
use crate::reasoner::{resolve_reasoner, Reasoner, ReasonerRequest};
use edgequake_llm::ImageData;
use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// ── Invoices ─────────────────────────────────────────────────────────────

/// Extract invoice fields from the first page of a PDF, or from an image.
pub async fn extract_invoice(
    path: impl AsRef<Path>,
    kind: FileKind,
    config: &ExpenseConfig,
) -> Result<InvoiceRecord, ExpenseError> {
    extract_invoice_page(path, kind, 0, config).await
}

/// Extract invoice fields from page `page_index` (0-based) of a PDF, or from
/// an image (where `page_index` is ignored).
///
/// # Errors
/// - `PageOutOfRange` when the PDF has no such page
/// - `UnsupportedImage` when an image is neither PNG nor JPEG
/// - `NoValidJson` / `MalformedResponse` when the reply holds no invoice
pub async fn extract_invoice_page(
    path: impl AsRef<Path>,
    kind: FileKind,
    page_index: usize,
    config: &ExpenseConfig,
) -> Result<InvoiceRecord, ExpenseError> {
    let path = path.as_ref();
    info!("Extracting invoice from {} ({})", path.display(), kind);

    let (reasoner, image) = match kind {
        FileKind::Image => {
            input::ensure_readable(path)?;
            let reasoner = resolve_reasoner(config)?;
            (reasoner, encode::load_image(path).await?)
        }
        FileKind::Pdf => {
            let resolved = input::resolve_local_pdf(path)?;
            let reasoner = resolve_reasoner(config)?;
            let pages = render::render_document(resolved.path(), config).await?;
            let total = pages.len();

            let image = match pages.pages().get(page_index) {
                Some(page) => encode::load_image(&page.path).await,
                None => Err(ExpenseError::PageOutOfRange {
                    page: page_index + 1,
                    total,
                }),
            };
            pages.release();
            (reasoner, image?)
        }
    };

    invoice_from_image(reasoner.as_ref(), image, config).await
}

async fn invoice_from_image(
    reasoner: &dyn Reasoner,
    image: ImageData,
    config: &ExpenseConfig,
) -> Result<InvoiceRecord, ExpenseError> {
    let request = ReasonerRequest::vision(
        INVOICE_EXTRACTION_PROMPT,
        image,
        config.vision_max_tokens,
        config.temperature,
    );
    let reply = reasoner.complete(&request).await?;
    let invoice: InvoiceRecord = recover_as(&reply, "invoice")?;

    debug!(
        "Invoice {}: {} line items",
        invoice.invoice_number.as_deref().unwrap_or("<unnumbered>"),
        invoice.items.len()
    );
    Ok(invoice)
}

// ── Policies ─────────────────────────────────────────────────────────────

/// Extract policy rules from a local PDF.
///
/// Returns `Ok` even when some pages fail; see
/// [`PolicyExtraction::page_errors`].
pub async fn extract_policies_from_pdf(
    path: impl AsRef<Path>,
    config: &ExpenseConfig,
) -> Result<PolicyExtraction, ExpenseError> {
    let resolved = input::resolve_local_pdf(path.as_ref())?;
    let reasoner = resolve_reasoner(config)?;
    policies_from_pdf(resolved.path(), reasoner, config).await
}

async fn policies_from_pdf(
    pdf: &Path,
    reasoner: Arc<dyn Reasoner>,
    config: &ExpenseConfig,
) -> Result<PolicyExtraction, ExpenseError> {
    info!("Extracting policies from {}", pdf.display());

    let render_start = Instant::now();
    let pages = render::render_document(pdf, config).await?;
    info!(
        "Rendered {} pages in {}ms",
        pages.len(),
        render_start.elapsed().as_millis()
    );

    let batch = PageProcessor::new(reasoner, config).run(pages).await;
    let raw = batch.policies.len();
    let policies = dedup::deduplicate(batch.policies);
    info!("Removed duplicates: {} → {} policies", raw, policies.len());

    Ok(PolicyExtraction {
        policies,
        page_count: Some(batch.page_count),
        page_errors: batch.errors,
    })
}

/// Cut `text` to at most `max_chars` characters, appending the truncation
/// marker when anything was removed.
pub fn truncate_text(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => Cow::Owned(format!("{}{}", &text[..cut], TRUNCATION_MARKER)),
        None => Cow::Borrowed(text),
    }
}

/// Extract policy rules from plain text.
///
/// A reply without a usable policy list yields an empty result rather than
/// an error; a failed reasoner call is an error.
pub async fn extract_policies_from_text(
    text: &str,
    config: &ExpenseConfig,
) -> Result<PolicyExtraction, ExpenseError> {
    let reasoner = resolve_reasoner(config)?;
    policies_from_text(text, reasoner.as_ref(), config).await
}

async fn policies_from_text(
    text: &str,
    reasoner: &dyn Reasoner,
    config: &ExpenseConfig,
) -> Result<PolicyExtraction, ExpenseError> {
    if text.trim().is_empty() {
        return Err(ExpenseError::InvalidInput {
            input: "<text>".into(),
            reason: "policy text is empty".into(),
        });
    }

    info!("Extracting policies from text ({} characters)", text.chars().count());
    let text = truncate_text(text, config.max_text_chars);
    if let Cow::Owned(_) = text {
        info!("Text truncated to {} characters", config.max_text_chars);
    }

    let request = ReasonerRequest::text(
        policy_extraction_prompt_for_text(&text),
        config.text_max_tokens,
        config.temperature,
    );
    let reply = reasoner.complete(&request).await?;

    let raw: Vec<PolicyRule> = match recover_as::<PolicyEnvelope>(&reply, "policy") {
        Ok(envelope) => envelope
            .policies
            .into_iter()
            .map(|rule| rule.ingest(None))
            .collect(),
        Err(e) => {
            warn!("{}; returning no policies", e);
            Vec::new()
        }
    };

    let count = raw.len();
    let policies = dedup::deduplicate(raw);
    info!("After deduplication: {} → {} policies", count, policies.len());

    Ok(PolicyExtraction {
        policies,
        ..Default::default()
    })
}

/// Extract policy rules from a web page or a PDF behind a URL.
///
/// PDF responses go through the page processor; anything else is reduced to
/// text and goes through [`extract_policies_from_text`].
pub async fn extract_policies_from_url(
    url: &str,
    config: &ExpenseConfig,
) -> Result<PolicyExtraction, ExpenseError> {
    if !input::is_url(url) {
        return Err(ExpenseError::InvalidInput {
            input: url.to_string(),
            reason: "expected an http:// or https:// URL".into(),
        });
    }

    let reasoner = resolve_reasoner(config)?;
    let body = input::fetch_url(url, config.fetch_timeout_secs, config.max_fetch_bytes).await?;

    if body.is_pdf() {
        let resolved = body.into_pdf().await?;
        return policies_from_pdf(resolved.path(), reasoner, config).await;
    }

    let raw = body.text();
    let text = if webtext::looks_like_html(&raw, body.content_type.as_deref()) {
        webtext::html_to_text(&raw)
    } else {
        raw
    };
    debug!("Reduced {} to {} characters of text", url, text.len());

    policies_from_text(&text, reasoner.as_ref(), config).await
}

/// Extract policy rules from a local PDF path or a URL.
pub async fn extract_policies(
    input: &str,
    config: &ExpenseConfig,
) -> Result<PolicyExtraction, ExpenseError> {
    if input::is_url(input) {
        extract_policies_from_url(input, config).await
    } else {
        extract_policies_from_pdf(input, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_borrowed() {
        assert!(matches!(truncate_text("abc", 3), Cow::Borrowed("abc")));
        assert!(matches!(truncate_text("", 0), Cow::Borrowed("")));
    }

    #[test]
    fn long_text_gets_the_marker() {
        assert_eq!(truncate_text("abcdef", 4), "abcd... [Content truncated]");
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_text("ééééé", 2), "éé... [Content truncated]");
        assert_eq!(truncate_text("ééé", 3), "ééé");
    }

    #[tokio::test]
    async fn url_entry_point_rejects_paths() {
        let err = extract_policies_from_url("/tmp/policy.pdf", &ExpenseConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExpenseError::InvalidInput { .. }));
    }
}

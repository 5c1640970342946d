//! Streaming policy extraction: emit per-page outcomes as they complete.
//!
//! [`crate::extract::extract_policies_from_pdf`] waits for every page, then
//! deduplicates. [`extract_policies_stream`] instead yields each page's raw
//! [`PageOutcome`] as soon as the reasoner answers, so callers can show
//! partial results on long handbooks. Outcomes arrive in completion order;
//! rules are not deduplicated and carry no ids.
//!
//! Page images are read into memory and the rendered files released before
//! the stream is returned, so the stream owns everything it needs. Progress
//! callbacks are not invoked; the consumer observes progress directly.

use crate::config::ExpenseConfig;
use crate::error::{ExpenseError, PageError};
use crate::pipeline::pages::{PageOutcome, PageProcessor};
use crate::pipeline::{encode, input, render};
use crate::reasoner::resolve_reasoner;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page outcomes.
pub type PageOutcomeStream = Pin<Box<dyn Stream<Item = PageOutcome> + Send>>;

/// Extract policies from a local PDF, streaming per-page outcomes.
///
/// # Returns
/// - `Ok(PageOutcomeStream)` — one item per rendered page
/// - `Err(ExpenseError)` — fatal error (file not found, not a PDF, no provider)
///
/// # Example
/// ```rust,no_run
/// use expensepal::{extract_policies_stream, ExpenseConfig, PageOutcome};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExpenseConfig::default();
/// let mut pages = extract_policies_stream("travel-policy.pdf", &config).await?;
/// while let Some(outcome) = pages.next().await {
///     match outcome {
///         PageOutcome::Extracted { page, policies } => println!("page {page}: {} rules", policies.len()),
///         PageOutcome::Failed(e) => eprintln!("{e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract_policies_stream(
    path: impl AsRef<Path>,
    config: &ExpenseConfig,
) -> Result<PageOutcomeStream, ExpenseError> {
    let path = path.as_ref();
    info!("Starting streaming extraction: {}", path.display());

    let resolved = input::resolve_local_pdf(path)?;
    let reasoner = resolve_reasoner(config)?;
    let pages = render::render_document(resolved.path(), config).await?;

    let mut loaded = Vec::with_capacity(pages.len());
    for page in pages.pages() {
        loaded.push((page.page_num, encode::load_image(&page.path).await));
    }
    pages.release();

    let processor = PageProcessor::new(reasoner, config);
    let concurrency = processor.concurrency();

    let s = stream::iter(loaded.into_iter().map(move |(page, image)| {
        let processor = processor.clone();
        async move {
            match image {
                Ok(image) => processor.extract(page, image).await,
                Err(e) => PageOutcome::Failed(PageError::ReadFailed {
                    page,
                    detail: e.to_string(),
                }),
            }
        }
    }))
    .buffer_unordered(concurrency);

    Ok(Box::pin(s))
}

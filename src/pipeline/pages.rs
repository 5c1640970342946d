//! Parallel page processor: fan rendered policy pages out to the reasoner
//! and fan the extracted rules back in.
//!
//! A [`PageProcessor`] is built per batch from [`ExpenseConfig`]; there is no
//! global worker pool. Up to `concurrency` page tasks run at once via
//! `buffer_unordered`. Outcomes are consumed by the driving task in
//! completion order, and that task alone appends to the merged list, so no
//! locking is needed. Page numbers are stamped on every rule but the merged
//! list is not re-sorted.
//!
//! A page failure never fails the batch: it becomes a [`PageError`], is
//! reported through the progress callback, and contributes zero rules.

use crate::config::ExpenseConfig;
use crate::error::{ExpenseError, PageError};
use crate::model::{PolicyEnvelope, PolicyRule};
use crate::pipeline::encode;
use crate::pipeline::recover::recover_as;
use crate::pipeline::render::{PageImage, RenderedPages};
use crate::progress::ProgressCallback;
use crate::prompts::POLICY_EXTRACTION_PROMPT;
use crate::reasoner::{Reasoner, ReasonerRequest};
use edgequake_llm::ImageData;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of processing one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PageOutcome {
    Extracted {
        page: usize,
        policies: Vec<PolicyRule>,
    },
    Failed(PageError),
}

impl PageOutcome {
    /// 1-based page number.
    pub fn page(&self) -> usize {
        match self {
            PageOutcome::Extracted { page, .. } => *page,
            PageOutcome::Failed(e) => e.page(),
        }
    }
}

/// Merged output of one batch, before deduplication.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageBatch {
    /// Rules from every successful page, in completion order.
    pub policies: Vec<PolicyRule>,
    pub page_count: usize,
    pub errors: Vec<PageError>,
}

/// Per-batch processor for rendered policy pages.
#[derive(Clone)]
pub struct PageProcessor {
    reasoner: Arc<dyn Reasoner>,
    concurrency: usize,
    max_tokens: usize,
    temperature: f32,
    progress: Option<ProgressCallback>,
}

impl PageProcessor {
    pub fn new(reasoner: Arc<dyn Reasoner>, config: &ExpenseConfig) -> Self {
        Self {
            reasoner,
            concurrency: config.concurrency.max(1),
            max_tokens: config.vision_max_tokens,
            temperature: config.temperature,
            progress: config.progress_callback.clone(),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Process every page, then release the page images.
    pub async fn run(&self, pages: RenderedPages) -> PageBatch {
        let start = Instant::now();
        let total = pages.len();
        let images: Vec<PageImage> = pages.pages().to_vec();

        if let Some(ref cb) = self.progress {
            cb.on_extraction_start(total);
        }

        let mut batch = PageBatch {
            page_count: total,
            ..Default::default()
        };
        let mut succeeded = 0usize;

        let mut outcomes = stream::iter(images.into_iter().map(|image| self.process(image, total)))
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                PageOutcome::Extracted { page, policies } => {
                    debug!("Page {}: {} policies", page, policies.len());
                    if let Some(ref cb) = self.progress {
                        cb.on_page_complete(page, total, policies.len());
                    }
                    succeeded += 1;
                    batch.policies.extend(policies);
                }
                PageOutcome::Failed(err) => {
                    warn!("{}", err);
                    if let Some(ref cb) = self.progress {
                        cb.on_page_error(err.page(), total, &err.to_string());
                    }
                    batch.errors.push(err);
                }
            }
        }
        drop(outcomes);

        pages.release();

        info!(
            "Processed {} pages in {}ms: {} policies, {} failed pages",
            total,
            start.elapsed().as_millis(),
            batch.policies.len(),
            batch.errors.len()
        );

        if let Some(ref cb) = self.progress {
            cb.on_extraction_complete(total, succeeded, batch.policies.len());
        }

        batch
    }

    async fn process(&self, image: PageImage, total: usize) -> PageOutcome {
        if let Some(ref cb) = self.progress {
            cb.on_page_start(image.page_num, total);
        }

        match encode::load_image(&image.path).await {
            Ok(data) => self.extract(image.page_num, data).await,
            Err(e) => PageOutcome::Failed(PageError::ReadFailed {
                page: image.page_num,
                detail: e.to_string(),
            }),
        }
    }

    /// Send one page image to the reasoner and parse its policy list.
    pub async fn extract(&self, page: usize, image: ImageData) -> PageOutcome {
        let request = ReasonerRequest::vision(
            POLICY_EXTRACTION_PROMPT,
            image,
            self.max_tokens,
            self.temperature,
        );

        let reply = match self.reasoner.complete(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                return PageOutcome::Failed(PageError::ReasonerFailed {
                    page,
                    detail: e.to_string(),
                })
            }
        };

        match recover_as::<PolicyEnvelope>(&reply, "policy") {
            Ok(envelope) => PageOutcome::Extracted {
                page,
                policies: envelope
                    .policies
                    .into_iter()
                    .map(|rule| rule.ingest(Some(page)))
                    .collect(),
            },
            Err(ExpenseError::NoValidJson { .. }) => {
                PageOutcome::Failed(PageError::NoValidJson { page })
            }
            Err(e) => PageOutcome::Failed(PageError::Malformed {
                page,
                detail: e.to_string(),
            }),
        }
    }
}

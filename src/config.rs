//! Configuration for extraction and compliance checking.
//!
//! Every knob lives in [`ExpenseConfig`], built via [`ExpenseConfigBuilder`].
//! One struct serves all entry points so a caller can build it once and share
//! it between invoice extraction, policy extraction and compliance checks.

use crate::error::ExpenseError;
use crate::pipeline::render::Rasterizer;
use crate::progress::ProgressCallback;
use crate::reasoner::Reasoner;
use std::fmt;
use std::sync::Arc;

/// Configuration shared by every expensepal operation.
///
/// Built via [`ExpenseConfig::builder()`] or using [`ExpenseConfig::default()`].
///
/// # Example
/// ```rust
/// use expensepal::ExpenseConfig;
///
/// let config = ExpenseConfig::builder()
///     .dpi(200)
///     .concurrency(6)
///     .provider_name("anthropic")
///     .model("claude-3-7-sonnet-20250219")
///     .model("claude-3-5-sonnet-20241022")
///     .build()
///     .unwrap();
/// assert_eq!(config.models.len(), 2);
/// ```
#[derive(Clone)]
pub struct ExpenseConfig {
    /// Rendering DPI for PDF pages. Range: 72–400. Default: 300.
    ///
    /// Receipts and policy handbooks use small print; 300 DPI keeps fine
    /// print legible for the vision model.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2400.
    pub max_rendered_pixels: u32,

    /// Number of concurrent page extractions. Default: 12.
    pub concurrency: usize,

    /// LLM provider name (e.g. "anthropic", "openai", "ollama").
    /// If None, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Candidate model ids, tried in order. A later model is used only when
    /// an earlier one reports itself unavailable. Empty means provider defaults.
    pub models: Vec<String>,

    /// Pre-constructed reasoner. Takes precedence over `provider_name` and `models`.
    pub reasoner: Option<Arc<dyn Reasoner>>,

    /// Rasteriser override. If None, pages are rendered with pdfium.
    pub rasterizer: Option<Arc<dyn Rasterizer>>,

    /// Sampling temperature for every reasoner call. Default: 0.1.
    pub temperature: f32,

    /// Token budget for image calls (policy pages, invoices). Default: 4000.
    pub vision_max_tokens: usize,

    /// Token budget for policy extraction from text. Default: 4000.
    pub text_max_tokens: usize,

    /// Token budget for a compliance evaluation. Default: 5000.
    pub compliance_max_tokens: usize,

    /// Text longer than this many characters is truncated before prompting. Default: 50 000.
    pub max_text_chars: usize,

    /// Timeout for fetching a policy URL, in seconds. Default: 60.
    pub fetch_timeout_secs: u64,

    /// Largest accepted body when fetching a policy URL, in bytes. Default: 10 MiB.
    pub max_fetch_bytes: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Per-page progress events for policy documents.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExpenseConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 2400,
            concurrency: 12,
            provider_name: None,
            models: Vec::new(),
            reasoner: None,
            rasterizer: None,
            temperature: 0.1,
            vision_max_tokens: 4000,
            text_max_tokens: 4000,
            compliance_max_tokens: 5000,
            max_text_chars: 50_000,
            fetch_timeout_secs: 60,
            max_fetch_bytes: 10 * 1024 * 1024,
            password: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExpenseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpenseConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("provider_name", &self.provider_name)
            .field("models", &self.models)
            .field("reasoner", &self.reasoner.as_ref().map(|_| "<dyn Reasoner>"))
            .field("rasterizer", &self.rasterizer.as_ref().map(|_| "<dyn Rasterizer>"))
            .field("temperature", &self.temperature)
            .field("vision_max_tokens", &self.vision_max_tokens)
            .field("text_max_tokens", &self.text_max_tokens)
            .field("compliance_max_tokens", &self.compliance_max_tokens)
            .field("max_text_chars", &self.max_text_chars)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("max_fetch_bytes", &self.max_fetch_bytes)
            .finish()
    }
}

impl ExpenseConfig {
    /// Create a new builder for `ExpenseConfig`.
    pub fn builder() -> ExpenseConfigBuilder {
        ExpenseConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExpenseConfig`].
#[derive(Debug)]
pub struct ExpenseConfigBuilder {
    config: ExpenseConfig,
}

impl ExpenseConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    /// Append a candidate model id.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.models.push(model.into());
        self
    }

    /// Replace the candidate model list.
    pub fn models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.config.reasoner = Some(reasoner);
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn vision_max_tokens(mut self, n: usize) -> Self {
        self.config.vision_max_tokens = n;
        self
    }

    pub fn text_max_tokens(mut self, n: usize) -> Self {
        self.config.text_max_tokens = n;
        self
    }

    pub fn compliance_max_tokens(mut self, n: usize) -> Self {
        self.config.compliance_max_tokens = n;
        self
    }

    pub fn max_text_chars(mut self, n: usize) -> Self {
        self.config.max_text_chars = n;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn max_fetch_bytes(mut self, bytes: u64) -> Self {
        self.config.max_fetch_bytes = bytes;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExpenseConfig, ExpenseError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(ExpenseError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(ExpenseError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.vision_max_tokens == 0 || c.text_max_tokens == 0 || c.compliance_max_tokens == 0 {
            return Err(ExpenseError::InvalidConfig(
                "Token budgets must be ≥ 1".into(),
            ));
        }
        if c.max_text_chars == 0 {
            return Err(ExpenseError::InvalidConfig(
                "max_text_chars must be ≥ 1".into(),
            ));
        }
        if c.models.iter().any(|m| m.trim().is_empty()) {
            return Err(ExpenseError::InvalidConfig(
                "Model ids must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

//! The external reasoner: the LLM service that reads pages and judges invoices.
//!
//! Everything in the crate talks to the model through the [`Reasoner`] trait,
//! so tests and embedding applications can substitute their own
//! implementation via [`crate::config::ExpenseConfigBuilder::reasoner`].
//!
//! [`LlmReasoner`] is the production implementation on top of `edgequake-llm`.
//! It holds one provider per candidate model id and tries them in order. It
//! moves to the next candidate only when the provider says the model itself
//! is unavailable; any other error ends the call. There are no retries.

use crate::config::ExpenseConfig;
use crate::error::{ExpenseError, ReasonerError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One request to the external reasoner.
#[derive(Clone)]
pub struct ReasonerRequest {
    pub prompt: String,
    /// Page or receipt image, for vision calls.
    pub image: Option<ImageData>,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl ReasonerRequest {
    pub fn text(prompt: impl Into<String>, max_tokens: usize, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            max_tokens,
            temperature,
        }
    }

    pub fn vision(
        prompt: impl Into<String>,
        image: ImageData,
        max_tokens: usize,
        temperature: f32,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(image),
            max_tokens,
            temperature,
        }
    }
}

impl fmt::Debug for ReasonerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReasonerRequest")
            .field("prompt_chars", &self.prompt.len())
            .field(
                "image",
                &self
                    .image
                    .as_ref()
                    .map(|img| format!("{} ({} b64 bytes)", img.mime_type, img.data.len())),
            )
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// A remote capability that turns a prompt (and optional image) into text.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn complete(&self, request: &ReasonerRequest) -> Result<String, ReasonerError>;
}

/// A model id paired with the provider instance that serves it.
#[derive(Clone)]
pub struct ModelCandidate {
    pub model: String,
    pub provider: Arc<dyn LLMProvider>,
}

/// [`Reasoner`] backed by `edgequake-llm` providers, with model fallback.
pub struct LlmReasoner {
    candidates: Vec<ModelCandidate>,
}

impl LlmReasoner {
    pub fn new(candidates: Vec<ModelCandidate>) -> Self {
        Self { candidates }
    }

    /// Wrap a single pre-built provider.
    pub fn single(model: impl Into<String>, provider: Arc<dyn LLMProvider>) -> Self {
        Self::new(vec![ModelCandidate {
            model: model.into(),
            provider,
        }])
    }

    /// Build one provider per model id for the named provider.
    pub fn for_provider(provider_name: &str, models: &[String]) -> Result<Self, ExpenseError> {
        if models.is_empty() {
            return Err(ExpenseError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: "No model configured for this provider; pass at least one --model.".into(),
            });
        }

        let candidates = models
            .iter()
            .map(|model| {
                ProviderFactory::create_llm_provider(provider_name, model)
                    .map(|provider| ModelCandidate {
                        model: model.clone(),
                        provider,
                    })
                    .map_err(|e| ExpenseError::ProviderNotConfigured {
                        provider: provider_name.to_string(),
                        hint: format!("{e}"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Using provider '{}' with models [{}]",
            provider_name,
            models.join(", ")
        );
        Ok(Self::new(candidates))
    }

    pub fn models(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.model.clone()).collect()
    }
}

#[async_trait]
impl Reasoner for LlmReasoner {
    async fn complete(&self, request: &ReasonerRequest) -> Result<String, ReasonerError> {
        let message = match &request.image {
            Some(image) => ChatMessage::user_with_images(&request.prompt, vec![image.clone()]),
            None => ChatMessage::user(&request.prompt),
        };
        let messages = vec![message];
        let options = build_options(request);
        let models = self.models();

        first_available(&models, |i| {
            let provider = Arc::clone(&self.candidates[i].provider);
            let messages = &messages;
            let options = &options;
            async move {
                provider
                    .chat(messages, Some(options))
                    .await
                    .map(|response| {
                        debug!(
                            "{} input tokens, {} output tokens",
                            response.prompt_tokens, response.completion_tokens
                        );
                        response.content
                    })
                    .map_err(|e| format!("{e}"))
            }
        })
        .await
    }
}

fn build_options(request: &ReasonerRequest) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        max_tokens: Some(request.max_tokens),
        ..Default::default()
    }
}

/// Provider error fragments that mean "this model cannot serve you", as
/// opposed to a failed request.
const UNAVAILABLE_MARKERS: &[&str] = &[
    "validationexception",
    "not found",
    "does not exist",
    "unavailable",
    "not available",
    "not supported",
    "no such model",
    "invalid model",
];

/// Whether a provider error signals that the requested model is unavailable.
pub fn is_model_unavailable(detail: &str) -> bool {
    let lower = detail.to_lowercase();
    lower.contains("model") && UNAVAILABLE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Call candidates in order until one answers.
///
/// `call(i)` performs the request against candidate `i` and yields the reply
/// text or the provider's error message.
async fn first_available<F, Fut>(models: &[String], mut call: F) -> Result<String, ReasonerError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<String, String>>,
{
    let mut last_error: Option<String> = None;

    for (i, model) in models.iter().enumerate() {
        match call(i).await {
            Ok(text) => {
                debug!("Model '{}' answered ({} chars)", model, text.len());
                return Ok(text);
            }
            Err(detail) if is_model_unavailable(&detail) => {
                warn!("Model '{}' unavailable, trying next candidate: {}", model, detail);
                last_error = Some(detail);
            }
            Err(detail) => {
                return Err(ReasonerError::Api {
                    model: model.clone(),
                    detail,
                });
            }
        }
    }

    Err(ReasonerError::NoModelAvailable {
        tried: models.to_vec(),
        last_error: last_error.unwrap_or_else(|| "no candidate models configured".to_string()),
    })
}

/// Default candidate models for well-known providers, best first.
pub fn default_models(provider_name: &str) -> Vec<String> {
    let models: &[&str] = match provider_name {
        "anthropic" => &["claude-3-7-sonnet-20250219", "claude-3-5-sonnet-20241022"],
        "openai" => &["gpt-4.1", "gpt-4.1-mini"],
        "gemini" => &["gemini-2.0-flash"],
        _ => &[],
    };
    models.iter().map(|m| m.to_string()).collect()
}

/// Resolve the reasoner, from most-specific to least-specific:
///
/// 1. **Pre-built reasoner** (`config.reasoner`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.models`, or
///    that provider's defaults.
/// 3. **Environment** `EXPENSEPAL_PROVIDER`, with `EXPENSEPAL_MODEL` tried
///    ahead of the configured or default models.
/// 4. **API keys**: `ANTHROPIC_API_KEY`, then `OPENAI_API_KEY`.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_reasoner(config: &ExpenseConfig) -> Result<Arc<dyn Reasoner>, ExpenseError> {
    if let Some(ref reasoner) = config.reasoner {
        return Ok(Arc::clone(reasoner));
    }

    let models_for = |provider: &str| {
        if config.models.is_empty() {
            default_models(provider)
        } else {
            config.models.clone()
        }
    };

    if let Some(ref name) = config.provider_name {
        return Ok(Arc::new(LlmReasoner::for_provider(name, &models_for(name))?));
    }

    if let Ok(provider) = std::env::var("EXPENSEPAL_PROVIDER") {
        if !provider.is_empty() {
            let mut models = models_for(&provider);
            if let Ok(model) = std::env::var("EXPENSEPAL_MODEL") {
                if !model.is_empty() && !models.contains(&model) {
                    models.insert(0, model);
                }
            }
            return Ok(Arc::new(LlmReasoner::for_provider(&provider, &models)?));
        }
    }

    for (key, provider) in [("ANTHROPIC_API_KEY", "anthropic"), ("OPENAI_API_KEY", "openai")] {
        if std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false) {
            return Ok(Arc::new(LlmReasoner::for_provider(
                provider,
                &models_for(provider),
            )?));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExpenseError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set ANTHROPIC_API_KEY or OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(Arc::new(LlmReasoner::single("auto", llm_provider)))
}

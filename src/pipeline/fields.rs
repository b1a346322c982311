//! Field extraction: ask a language model for the five blood-count values
//! and parse its `Label: value` answer.
//!
//! The model call is the only network I/O in the crate. It is thin on
//! purpose: prompts live in [`crate::prompts`], answer cleanup and parsing in
//! [`crate::pipeline::postprocess`], so neither changes retry or provider
//! logic here.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient. Exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`, saturating) with the default 500 ms base and 2
//! retries waits 500 ms → 1 s, so a report costs at most ~1.5 s of back-off.

use crate::config::{FieldExtractionConfig, DEFAULT_FIELD_MODEL};
use crate::error::BloodCountError;
use crate::output::{BloodTestFields, FieldMap};
use crate::pipeline::postprocess::{clean_model_response, parse_fields};
use crate::prompts::{build_user_message, DEFAULT_SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Turns recovered report text into a [`FieldMap`] via a language model.
pub struct FieldExtractor {
    provider: Arc<dyn LLMProvider>,
    config: FieldExtractionConfig,
}

impl std::fmt::Debug for FieldExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldExtractor")
            .field("provider", &"<dyn LLMProvider>")
            .field("config", &self.config)
            .finish()
    }
}

impl FieldExtractor {
    /// Resolve the provider from `config` and the environment.
    ///
    /// Fails with [`BloodCountError::ProviderNotConfigured`] when no provider
    /// can be found; nothing is sent over the network here.
    pub fn new(config: FieldExtractionConfig) -> Result<Self, BloodCountError> {
        let provider = resolve_provider(&config)?;
        Ok(Self { provider, config })
    }

    /// Use an already-constructed provider.
    pub fn with_provider(provider: Arc<dyn LLMProvider>, config: FieldExtractionConfig) -> Self {
        Self { provider, config }
    }

    /// Ask the model for the fields of one report.
    ///
    /// Blank input returns an empty map without calling the model. An answer
    /// with no `Label: value` line is [`BloodCountError::EmptyModelResponse`].
    pub async fn extract(&self, report_text: &str) -> Result<FieldMap, BloodCountError> {
        if report_text.trim().is_empty() {
            warn!("Report text is blank; skipping field extraction");
            return Ok(FieldMap::new());
        }

        let messages = build_messages(report_text, &self.config);
        let options = build_options(&self.config);
        let start = Instant::now();

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.config.retry_backoff_ms, attempt);
                warn!(
                    "Field extraction: retry {}/{} after {}ms",
                    attempt, self.config.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "Field extraction: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    let fields = fields_from_response(&response.content)?;
                    info!("Extracted {} fields", fields.len());
                    return Ok(fields);
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("Field extraction: attempt {} failed: {}", attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(BloodCountError::LlmApiError {
            retries: self.config.max_retries,
            message: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }

    /// Like [`extract`](Self::extract), converted to typed values.
    pub async fn extract_typed(&self, report_text: &str) -> Result<BloodTestFields, BloodCountError> {
        let fields = self.extract(report_text).await?;
        Ok(BloodTestFields::from_field_map(&fields))
    }
}

/// One-shot helper: resolve a provider and extract the fields of `report_text`.
pub async fn extract_fields(
    report_text: &str,
    config: FieldExtractionConfig,
) -> Result<FieldMap, BloodCountError> {
    FieldExtractor::new(config)?.extract(report_text).await
}

/// Clean and parse a raw model answer.
pub fn fields_from_response(raw: &str) -> Result<FieldMap, BloodCountError> {
    let fields = parse_fields(&clean_model_response(raw));
    if fields.is_empty() {
        return Err(BloodCountError::EmptyModelResponse);
    }
    Ok(fields)
}

/// System prompt (or override) followed by the report-bearing user message.
fn build_messages(report_text: &str, config: &FieldExtractionConfig) -> Vec<ChatMessage> {
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(build_user_message(report_text)),
    ]
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, saturating.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

fn build_options(config: &FieldExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, BloodCountError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        BloodCountError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
fn resolve_provider(config: &FieldExtractionConfig) -> Result<Arc<dyn LLMProvider>, BloodCountError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_FIELD_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_FIELD_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| BloodCountError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

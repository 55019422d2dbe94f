//! Runtime configuration for the vision-model transcription path.
//!
//! The transcription *rules* live in [`crate::rules::TranscriptionRuleSet`];
//! this module only holds the knobs of the VLM adapter that sits in front of
//! them: which provider and model to call, sampling, retries, and how many
//! pages run at once in a batch. Built via [`VlmConfig::builder`].

use crate::error::Page2MdError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for VLM-backed transcription and batch runs.
///
/// # Example
/// ```rust
/// use edgequake_page2md::VlmConfig;
///
/// let config = VlmConfig::builder()
///     .model("gpt-4.1-nano")
///     .concurrency(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone)]
pub struct VlmConfig {
    /// LLM model identifier, e.g. "gpt-4.1-nano". If None, uses the
    /// provider's default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected from the
    /// environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Transcription wants the model to be faithful, not creative.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Retry attempts on a failed VLM call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled on each attempt.
    /// Default: 500.
    pub retry_backoff_ms: u64,

    /// Pages transcribed at once by the batch entry points. Default: 10.
    pub concurrency: usize,

    /// Optional per-page progress events for batch runs.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for VlmConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            concurrency: 10,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for VlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VlmConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn TranscriptionProgress>"),
            )
            .finish()
    }
}

impl VlmConfig {
    pub fn builder() -> VlmConfigBuilder {
        VlmConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`VlmConfig`].
#[derive(Debug)]
pub struct VlmConfigBuilder {
    config: VlmConfig,
}

impl VlmConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t;
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<VlmConfig, Page2MdError> {
        let c = &self.config;
        if !(0.0..=2.0).contains(&c.temperature) {
            return Err(Page2MdError::config(
                "temperature",
                format!("must be in [0, 2], got {}", c.temperature),
            ));
        }
        if c.max_tokens == 0 {
            return Err(Page2MdError::config("max_tokens", "must be at least 1"));
        }
        if c.concurrency == 0 {
            return Err(Page2MdError::config("concurrency", "must be at least 1"));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgressCallback;

    #[test]
    fn defaults() {
        let c = VlmConfig::default();
        assert_eq!(c.temperature, 0.1);
        assert_eq!(c.max_tokens, 4096);
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.retry_backoff_ms, 500);
        assert_eq!(c.concurrency, 10);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = VlmConfig::builder().concurrency(0).build().unwrap_err();
        assert!(matches!(
            err,
            Page2MdError::InvalidConfiguration { ref field, .. } if field == "concurrency"
        ));
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        assert!(VlmConfig::builder().temperature(3.5).build().is_err());
        assert!(VlmConfig::builder().temperature(0.0).build().is_ok());
    }

    #[test]
    fn debug_hides_trait_objects() {
        let c = VlmConfig::builder()
            .progress_callback(Arc::new(NoopProgressCallback))
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("<dyn TranscriptionProgress>"));
    }
}

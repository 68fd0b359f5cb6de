//! Configuration types for layout extraction.
//!
//! All engine behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. Every knob lives in one `Clone` struct so
//! the same config can drive the library entry points, the streaming API and
//! the CLI.

use crate::error::LayoutError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a layout extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use fieldguide_layout::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .min_interval_ms(1000)
///     .page_attempts(5)
///     .save_crops(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.page_attempts, 5);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Minimum gap between the starts of two recognition calls, in
    /// milliseconds. Default: 2000.
    ///
    /// Applies to every call attempt, retries included.
    pub min_interval_ms: u64,

    /// Attempts of the whole match/split/recognise sequence for one page.
    /// Default: 3.
    pub page_attempts: u32,

    /// Base delay before the second page attempt, doubled for each further
    /// attempt. Default: 5000.
    pub page_backoff_ms: u64,

    /// Upper bound of the page retry delay. Default: 60000.
    pub page_backoff_cap_ms: u64,

    /// Attempts per recognition call, the first one included. Default: 3.
    pub recognition_attempts: u32,

    /// Base delay after a transient recognition failure, doubled for each
    /// further attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Fixed extra wait after the backend signals rate limiting. Default: 5000.
    pub rate_limit_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Model identifier, e.g. "gemini-2.0-flash". If None, uses the
    /// provider's default.
    pub model: Option<String>,

    /// Provider name (e.g. "gemini", "openai", "ollama").
    /// If None along with `provider`, the provider is detected from the
    /// environment.
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the completion. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per caption. Default: 4096.
    pub max_tokens: usize,

    /// Custom recognition prompt. If None, uses
    /// [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Persist the photo and caption crops next to each page. Default: true.
    pub save_crops: bool,

    /// Optional per-page progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 2000,
            page_attempts: 3,
            page_backoff_ms: 5000,
            page_backoff_cap_ms: 60_000,
            recognition_attempts: 3,
            retry_backoff_ms: 500,
            rate_limit_backoff_ms: 5000,
            api_timeout_secs: 60,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            system_prompt: None,
            save_crops: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("min_interval_ms", &self.min_interval_ms)
            .field("page_attempts", &self.page_attempts)
            .field("page_backoff_ms", &self.page_backoff_ms)
            .field("page_backoff_cap_ms", &self.page_backoff_cap_ms)
            .field("recognition_attempts", &self.recognition_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("rate_limit_backoff_ms", &self.rate_limit_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("save_crops", &self.save_crops)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Delay before page attempt `next_attempt` (1-based, so the first
    /// retry is attempt 2): `min(base × 2^(next_attempt - 2), cap)`.
    pub fn page_backoff(&self, next_attempt: u32) -> Duration {
        let exponent = next_attempt.saturating_sub(2).min(32);
        let ms = self
            .page_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.page_backoff_cap_ms);
        Duration::from_millis(ms)
    }

    /// Delay after the `failed_attempts`-th failed recognition call.
    ///
    /// Rate-limit signals add the fixed rate-limit wait (or the server's
    /// `Retry-After`, whichever is longer) on top of the exponential part.
    pub fn recognition_backoff(
        &self,
        failed_attempts: u32,
        retry_after_secs: Option<u64>,
        rate_limited: bool,
    ) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(32);
        let exponential = self.retry_backoff_ms.saturating_mul(1u64 << exponent);
        let extra = if rate_limited {
            retry_after_secs
                .map(|s| s.saturating_mul(1000))
                .unwrap_or(0)
                .max(self.rate_limit_backoff_ms)
        } else {
            0
        };
        Duration::from_millis(exponential.saturating_add(extra))
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn min_interval_ms(mut self, ms: u64) -> Self {
        self.config.min_interval_ms = ms;
        self
    }

    pub fn page_attempts(mut self, n: u32) -> Self {
        self.config.page_attempts = n;
        self
    }

    pub fn page_backoff_ms(mut self, ms: u64) -> Self {
        self.config.page_backoff_ms = ms;
        self
    }

    pub fn page_backoff_cap_ms(mut self, ms: u64) -> Self {
        self.config.page_backoff_cap_ms = ms;
        self
    }

    pub fn recognition_attempts(mut self, n: u32) -> Self {
        self.config.recognition_attempts = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn rate_limit_backoff_ms(mut self, ms: u64) -> Self {
        self.config.rate_limit_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

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
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn save_crops(mut self, v: bool) -> Self {
        self.config.save_crops = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, LayoutError> {
        let c = &self.config;
        if c.page_attempts == 0 {
            return Err(LayoutError::InvalidConfig(
                "Page attempts must be ≥ 1".into(),
            ));
        }
        if c.recognition_attempts == 0 {
            return Err(LayoutError::InvalidConfig(
                "Recognition attempts must be ≥ 1".into(),
            ));
        }
        if c.page_backoff_cap_ms < c.page_backoff_ms {
            return Err(LayoutError::InvalidConfig(format!(
                "Page backoff cap ({}ms) is below the base backoff ({}ms)",
                c.page_backoff_cap_ms, c.page_backoff_ms
            )));
        }
        Ok(self.config)
    }
}

//! Caption recognition: the backend seam, the vision-model backend, response
//! parsing and the call-level retry policy.
//!
//! The orchestrator only ever talks to a [`RecognitionBackend`]. The default
//! implementation, [`VisionRecognizer`], sends each caption crop to an
//! `edgequake-llm` vision provider; tests swap in a scripted backend.
//!
//! ## Call-level retry
//!
//! Every attempt first takes a slot from the [`RateLimiter`]. Failures are
//! classified before retrying:
//!
//! * rate limited → wait the rate-limit backoff plus the exponential part,
//!   then retry
//! * transient (timeout, network, 5xx) → wait `retry_backoff_ms × 2^n`, retry
//! * anything else → returned immediately
//!
//! An empty response is a success with empty content, not an error.

use crate::config::ExtractionConfig;
use crate::error::{LayoutError, RecognitionError};
use crate::output::UNKNOWN_NAME;
use crate::pipeline::encode::encode_png;
use crate::pipeline::limiter::RateLimiter;
use crate::prompts::{DEFAULT_SYSTEM_PROMPT, DESCRIPTION_LABELS, NAME_LABELS};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Default model used when a provider is named without a model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-nano";

/// Name and full text read from one caption crop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedText {
    pub name: String,
    pub text: String,
}

impl RecognizedText {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Result for an empty response or a failed call.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_NAME, "")
    }
}

/// Reads a caption crop.
///
/// `png` is one PNG-encoded caption region. Implementations must keep the
/// error kinds distinct: the retry policy treats them differently.
pub trait RecognitionBackend: Send + Sync {
    fn recognize(
        &self,
        png: &[u8],
    ) -> impl Future<Output = Result<RecognizedText, RecognitionError>> + Send;
}

// ── Response parsing ─────────────────────────────────────────────────────

fn label_regex(labels: &[&str], multiline_value: bool) -> Regex {
    let alternatives: Vec<String> = labels.iter().map(|l| regex::escape(l)).collect();
    let value = if multiline_value { r"(?s:(.*))" } else { r"(.*)$" };
    let pattern = format!(
        r"(?m)^[ \t]*(?:{})[ \t]*[:：][ \t]*{}",
        alternatives.join("|"),
        value
    );
    Regex::new(&pattern).unwrap()
}

static RE_NAME: Lazy<Regex> = Lazy::new(|| label_regex(NAME_LABELS, false));
static RE_DESCRIPTION: Lazy<Regex> = Lazy::new(|| label_regex(DESCRIPTION_LABELS, true));
static RE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*```[^\n]*\n?").unwrap());

/// Turn a model response into a name and full text.
///
/// * `Name:` / `植物名:` line → name (rest of that line)
/// * `Description:` / `説明文:` → text (everything after the label)
/// * name label missing → first line of the text
/// * no labels at all → first non-empty line as name, whole response as text
/// * empty response → `unknown` with empty text
pub fn parse_response(content: &str) -> RecognizedText {
    let cleaned = RE_FENCE.replace_all(content, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return RecognizedText::unknown();
    }

    let name = RE_NAME
        .captures(cleaned)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());

    let text = RE_DESCRIPTION
        .captures(cleaned)
        .and_then(|c| c.get(1))
        .map(|m| strip_name_lines(m.as_str()));

    let (name, text) = match (name, text) {
        (Some(name), Some(text)) => (name, text),
        (Some(name), None) => (name, strip_name_lines(cleaned)),
        (None, Some(text)) => (first_line(&text).unwrap_or(UNKNOWN_NAME).to_string(), text),
        (None, None) => (
            first_line(cleaned).unwrap_or(UNKNOWN_NAME).to_string(),
            cleaned.to_string(),
        ),
    };
    RecognizedText { name, text }
}

fn strip_name_lines(s: &str) -> String {
    s.lines()
        .filter(|line| !RE_NAME.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn first_line(s: &str) -> Option<&str> {
    s.lines().map(str::trim).find(|l| !l.is_empty())
}

// ── Error classification ─────────────────────────────────────────────────

static RE_RETRY_AFTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)retry[- _]after\D{0,8}(\d+)").unwrap());

static RE_RATE_LIMITED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b429\b|\brate[- _]?limit|\btoo many requests\b|\bquota\b").unwrap()
});

/// 5xx only next to an HTTP context word or reason phrase, so token counts
/// and other numbers in the message do not count.
static RE_SERVER_STATUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:status|http|code|error)\W{0,10}5\d{2}\b|\b5\d{2}\s+(?:internal server error|bad gateway|service unavailable|gateway time-?out)",
    )
    .unwrap()
});

static RE_TRANSIENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\btime(?:d)?[ -]?out\b|\bconnection (?:reset|refused|closed|aborted|error|failed)\b|\bnetwork\b|\btemporarily\b|\boverloaded\b|\bunavailable\b|\berror sending request\b",
    )
    .unwrap()
});

/// Map a provider error message onto the retry policy's error kinds.
///
/// Providers surface HTTP failures as formatted strings, so classification
/// is by message content.
pub fn classify_error(message: &str) -> RecognitionError {
    if RE_RATE_LIMITED.is_match(message) {
        let retry_after_secs = RE_RETRY_AFTER
            .captures(message)
            .and_then(|c| c[1].parse().ok());
        return RecognitionError::RateLimited { retry_after_secs };
    }

    if RE_SERVER_STATUS.is_match(message) || RE_TRANSIENT.is_match(message) {
        return RecognitionError::Transient(message.to_string());
    }

    RecognitionError::Api(message.to_string())
}

// ── Retry policy ─────────────────────────────────────────────────────────

/// Run one recognition call under the rate limiter and call-level retry
/// policy.
///
/// Returns the last error once attempts are exhausted or a non-retryable
/// error occurs; the orchestrator turns that into an `unknown` entry.
pub async fn recognize_with_retry<B: RecognitionBackend>(
    backend: &B,
    limiter: &mut RateLimiter,
    png: &[u8],
    config: &ExtractionConfig,
) -> Result<RecognizedText, RecognitionError> {
    let max_attempts = config.recognition_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        limiter.acquire().await;

        let err = match backend.recognize(png).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };

        if !err.is_retryable() {
            warn!("Recognition attempt {} failed (not retried): {}", attempt, err);
            return Err(err);
        }
        if attempt >= max_attempts {
            warn!(
                "Recognition failed after {} attempts: {}",
                max_attempts, err
            );
            return Err(err);
        }

        let backoff = match &err {
            RecognitionError::RateLimited { retry_after_secs } => {
                config.recognition_backoff(attempt, *retry_after_secs, true)
            }
            _ => config.recognition_backoff(attempt, None, false),
        };
        warn!(
            "Recognition attempt {}/{} failed, retrying in {}ms: {}",
            attempt,
            max_attempts,
            backoff.as_millis(),
            err
        );
        sleep(backoff).await;
    }
}

// ── Vision-model backend ─────────────────────────────────────────────────

/// Recognition backend that asks a vision model to read the caption.
pub struct VisionRecognizer {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
    timeout: Duration,
}

impl fmt::Debug for VisionRecognizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionRecognizer")
            .field("provider", &"<dyn LLMProvider>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl VisionRecognizer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
            timeout: config.api_timeout(),
        }
    }

    /// Resolve the provider from the config and environment.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, LayoutError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }
}

impl RecognitionBackend for VisionRecognizer {
    async fn recognize(&self, png: &[u8]) -> Result<RecognizedText, RecognitionError> {
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images("", vec![encode_png(png)]),
        ];

        let start = Instant::now();
        let response = tokio::time::timeout(
            self.timeout,
            self.provider.chat(&messages, Some(&self.options)),
        )
        .await
        .map_err(|_| {
            RecognitionError::Transient(format!(
                "request timed out after {}s",
                self.timeout.as_secs()
            ))
        })?
        .map_err(|e| classify_error(&format!("{}", e)))?;

        debug!(
            "Recognition: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(parse_response(&response.content))
    }
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn default_model_for(provider: &str) -> &'static str {
    if provider.eq_ignore_ascii_case("gemini") {
        DEFAULT_GEMINI_MODEL
    } else {
        DEFAULT_OPENAI_MODEL
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, LayoutError> {
    info!("Using provider {} with model {}", provider_name, model);
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        LayoutError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is
/// 2. `config.provider_name` with `config.model` (or the provider's default)
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. `GEMINI_API_KEY` present → Gemini
/// 5. `ProviderFactory::from_env` auto-detection
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, LayoutError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or_else(|| default_model_for(name));
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
            return create_vision_provider("gemini", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| LayoutError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[test]
    fn build_options_defaults() {
        let config = ExtractionConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn parses_labelled_response() {
        let r = parse_response("植物名: ヨモギ\n説明文: ヨモギ\nキク科\n多年生草本");
        assert_eq!(r.name, "ヨモギ");
        assert_eq!(r.text, "ヨモギ\nキク科\n多年生草本");

        let r = parse_response("Name: Hakobe\nDescription：Caryophyllaceae\nannual");
        assert_eq!(r, RecognizedText::new("Hakobe", "Caryophyllaceae\nannual"));
    }

    #[test]
    fn name_falls_back_to_first_description_line() {
        let r = parse_response("説明文: ハコベ\nナデシコ科\n一年草");
        assert_eq!(r.name, "ハコベ");
        assert_eq!(r.text, "ハコベ\nナデシコ科\n一年草");
    }

    #[test]
    fn unlabelled_response_uses_first_line() {
        let r = parse_response("\n  Dokudami\nHouttuynia cordata\n");
        assert_eq!(r.name, "Dokudami");
        assert_eq!(r.text, "Dokudami\nHouttuynia cordata");
    }

    #[test]
    fn empty_response_is_unknown() {
        assert_eq!(parse_response("   \n"), RecognizedText::unknown());
        assert_eq!(parse_response("```\n```"), RecognizedText::unknown());
    }

    #[test]
    fn code_fences_are_ignored() {
        let r = parse_response("```text\nName: Seri\nDescription: Apiaceae\n```");
        assert_eq!(r, RecognizedText::new("Seri", "Apiaceae"));
    }

    #[test]
    fn name_without_description_label() {
        let r = parse_response("Name: Nazuna\nBrassicaceae");
        assert_eq!(r, RecognizedText::new("Nazuna", "Brassicaceae"));
    }

    #[test]
    fn classifies_provider_errors() {
        assert_eq!(
            classify_error("HTTP 429 Too Many Requests (retry-after: 12)"),
            RecognitionError::RateLimited {
                retry_after_secs: Some(12)
            }
        );
        assert_eq!(
            classify_error("Rate limit exceeded"),
            RecognitionError::RateLimited {
                retry_after_secs: None
            }
        );
        assert!(matches!(
            classify_error("connection reset by peer"),
            RecognitionError::Transient(_)
        ));
        assert!(matches!(
            classify_error("status 503 Service Unavailable"),
            RecognitionError::Transient(_)
        ));
        assert!(matches!(
            classify_error("401 invalid api key"),
            RecognitionError::Api(_)
        ));
        assert!(matches!(
            classify_error("HTTP 502 from upstream"),
            RecognitionError::Transient(_)
        ));
        assert!(matches!(
            classify_error("request timed out"),
            RecognitionError::Transient(_)
        ));
    }

    #[test]
    fn numbers_and_words_in_other_errors_are_not_transient() {
        for msg in [
            "max 5000 tokens exceeded",
            "image larger than 500 KB",
            "invalid connection string",
            "prompt is 1429 tokens too long",
        ] {
            assert!(
                matches!(classify_error(msg), RecognitionError::Api(_)),
                "{msg} misclassified"
            );
        }
    }

    struct Scripted {
        replies: Mutex<VecDeque<Result<RecognizedText, RecognitionError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<RecognizedText, RecognitionError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl RecognitionBackend for Scripted {
        async fn recognize(&self, _png: &[u8]) -> Result<RecognizedText, RecognitionError> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(RecognizedText::unknown()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_with_backoff() {
        let backend = Scripted::new(vec![
            Err(RecognitionError::Transient("timeout".into())),
            Err(RecognitionError::Transient("timeout".into())),
            Ok(RecognizedText::new("Seri", "")),
        ]);
        let config = ExtractionConfig::default();
        let mut limiter = RateLimiter::from_millis(0);

        let start = tokio::time::Instant::now();
        let result = recognize_with_retry(&backend, &mut limiter, b"png", &config).await;
        assert_eq!(result.unwrap().name, "Seri");
        assert_eq!(backend.calls(), 3);
        // 500ms + 1000ms of backoff
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_longer() {
        let backend = Scripted::new(vec![
            Err(RecognitionError::RateLimited {
                retry_after_secs: None,
            }),
            Ok(RecognizedText::new("Seri", "")),
        ]);
        let config = ExtractionConfig::default();
        let mut limiter = RateLimiter::from_millis(0);

        let start = tokio::time::Instant::now();
        recognize_with_retry(&backend, &mut limiter, b"png", &config)
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(5500));
    }

    #[tokio::test(start_paused = true)]
    async fn api_error_is_not_retried() {
        let backend = Scripted::new(vec![Err(RecognitionError::Api("bad request".into()))]);
        let config = ExtractionConfig::default();
        let mut limiter = RateLimiter::from_millis(0);

        let err = recognize_with_retry(&backend, &mut limiter, b"png", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, RecognitionError::Api(_)));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_configured_attempts() {
        let backend = Scripted::new(vec![
            Err(RecognitionError::Transient("network".into())),
            Err(RecognitionError::Transient("network".into())),
            Err(RecognitionError::Transient("network".into())),
            Ok(RecognizedText::new("never", "")),
        ]);
        let config = ExtractionConfig::default();
        let mut limiter = RateLimiter::from_millis(0);

        let err = recognize_with_retry(&backend, &mut limiter, b"png", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, RecognitionError::Transient(_)));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_spaces_every_attempt() {
        let backend = Scripted::new(vec![
            Err(RecognitionError::Transient("network".into())),
            Ok(RecognizedText::new("Seri", "")),
        ]);
        let config = ExtractionConfig::builder()
            .retry_backoff_ms(100)
            .build()
            .unwrap();
        let mut limiter = RateLimiter::from_millis(2000);

        let start = tokio::time::Instant::now();
        recognize_with_retry(&backend, &mut limiter, b"png", &config)
            .await
            .unwrap();
        // The retry waits 100ms backoff, then the rest of the 2s interval.
        assert_eq!(start.elapsed(), Duration::from_millis(2000));
    }
}

//! Error types for the fieldguide-layout library.
//!
//! Three error types reflect three failure scopes:
//!
//! * [`LayoutError`]: errors raised by a component or by run setup
//!   (input not found, image cannot be decoded, crop out of bounds, provider
//!   not configured). Setup errors abort a run; component errors are absorbed
//!   by the orchestrator according to the page state machine.
//!
//! * [`PageError`]: **Non-fatal**: one page reached the `Failed` state.
//!   Stored inside [`crate::output::PageOutcome`] and collected into the
//!   [`crate::output::RunSummary`]; the run always moves on to the next page.
//!
//! * [`RecognitionError`]: one recognition call failed. The variants carry
//!   exactly the distinction the call-level retry policy needs: rate limited,
//!   transient, or anything else.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the engine's components and by run setup.
#[derive(Debug, Error)]
pub enum LayoutError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input path was not found.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// A single-file input that is not a PNG.
    #[error("Input file is not a PNG: '{path}'")]
    NotAPng { path: PathBuf },

    /// The input directory could not be listed.
    #[error("Failed to read directory '{path}': {source}")]
    ReadDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Image errors ──────────────────────────────────────────────────────
    /// The page image could not be read or decoded.
    #[error("Failed to decode image '{path}': {detail}")]
    ImageDecode { path: PathBuf, detail: String },

    /// A template rectangle could not be cropped from the page.
    ///
    /// Raised after a successful template match, so it points at a
    /// template/image inconsistency rather than an unrecognised page.
    #[error("Crop failed for slot {slot} ({region}): {detail}")]
    Crop {
        slot: usize,
        region: &'static str,
        detail: String,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The page is reported as `Failed`; other pages are unaffected.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Every attempt of the match/split/recognise sequence failed.
    #[error("{page}: failed after {attempts} attempts: {detail}")]
    RetriesExhausted {
        page: String,
        attempts: u32,
        detail: String,
    },

    /// The assembled record did not pass structural validation.
    #[error("{page}: generated record is invalid: {detail}")]
    InvalidRecord { page: String, detail: String },

    /// The record could not be written to disk.
    #[error("{page}: failed to persist record: {detail}")]
    PersistFailed { page: String, detail: String },
}

impl PageError {
    /// Page identifier the error belongs to.
    pub fn page(&self) -> &str {
        match self {
            PageError::RetriesExhausted { page, .. }
            | PageError::InvalidRecord { page, .. }
            | PageError::PersistFailed { page, .. } => page,
        }
    }
}

/// Failure of a single recognition call.
///
/// An empty but successful response is *not* an error; it is returned as an
/// empty [`crate::pipeline::recognize::RecognizedText`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecognitionError {
    /// Backend signalled HTTP 429 / quota exhaustion.
    #[error("rate limited by recognition backend")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Network failure, timeout or 5xx, worth retrying shortly.
    #[error("transient recognition failure: {0}")]
    Transient(String),

    /// Any other failure (bad request, auth, malformed response).
    #[error("recognition failed: {0}")]
    Api(String),
}

impl RecognitionError {
    /// Whether the call-level retry policy applies to this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RecognitionError::RateLimited { .. } | RecognitionError::Transient(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_display() {
        let e = LayoutError::Crop {
            slot: 2,
            region: "photo",
            detail: "rectangle exceeds image bounds".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("slot 2"), "got: {msg}");
        assert!(msg.contains("photo"), "got: {msg}");
    }

    #[test]
    fn retries_exhausted_display() {
        let e = PageError::RetriesExhausted {
            page: "p012.png".into(),
            attempts: 3,
            detail: "boom".into(),
        };
        assert!(e.to_string().contains("3 attempts"));
        assert_eq!(e.page(), "p012.png");
    }

    #[test]
    fn retryable_classification() {
        assert!(RecognitionError::RateLimited {
            retry_after_secs: None
        }
        .is_retryable());
        assert!(RecognitionError::Transient("reset".into()).is_retryable());
        assert!(!RecognitionError::Api("401".into()).is_retryable());
    }

    #[test]
    fn page_error_serializes() {
        let e = PageError::InvalidRecord {
            page: "a.png".into(),
            detail: "plants[0].name cannot be empty".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("InvalidRecord"));
    }
}

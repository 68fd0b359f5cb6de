//! # fieldguide-layout
//!
//! Turn scanned plant field-guide pages into structured per-entry records:
//! each illustrated plant's name, photo region and caption region.
//!
//! Each page image is classified against a small catalog of known page
//! layouts using a border edge-density score, split into per-entry photo
//! and caption crops, and every caption is read by a vision model under a
//! rate limit with retries. The result is validated and written next to the
//! page as `<base>_layout.json`; a later run skips pages whose record is
//! already valid.
//!
//! ## Pipeline Overview
//!
//! ```text
//! page.png
//!  │
//!  ├─ 1. Check    valid <base>_layout.json present? → Skipped
//!  ├─ 2. Edges    greyscale + invert (CPU-bound, spawn_blocking)
//!  ├─ 3. Match    score every template, lowest ≤ 0.05 wins
//!  ├─ 4. Split    crop photo / caption per slot, optionally save crops
//!  ├─ 5. Read     caption → vision model, rate limited, retried
//!  └─ 6. Persist  validate, write JSON atomically
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fieldguide_layout::{extract_layouts, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = ExtractionConfig::default();
//!     let summary = extract_layouts("scans/", &config).await?;
//!     eprintln!(
//!         "{} succeeded, {} skipped, {} failed",
//!         summary.succeeded, summary.skipped, summary.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fieldguide` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! fieldguide-layout = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod overlay;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;
pub mod templates;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{LayoutError, PageError, RecognitionError};
pub use extract::{extract_layouts, extract_layouts_sync, extract_layouts_with, Extractor};
pub use output::{Entry, PageOutcome, PageRecord, PageStatus, Rect, RunSummary};
pub use overlay::{generate_overlays, OverlayIssue, OverlayOptions, OverlaySummary};
pub use pipeline::recognize::{RecognitionBackend, RecognizedText, VisionRecognizer};
pub use pipeline::validate::{validate_value, ValidationError};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_stream, stream_layouts, OutcomeStream};
pub use templates::{Template, CATALOG};

//! Page orchestration: skip-on-existing, match, split, recognise, validate,
//! persist.
//!
//! [`Extractor`] owns the recognition backend, the rate limiter and the
//! config, and drives each page to one of three terminal states:
//!
//! ```text
//! ┌──────────────┐ valid record on disk  ┌─────────┐
//! │ check layout ├──────────────────────▶│ Skipped │
//! └──────┬───────┘                       └─────────┘
//!        │ missing / invalid
//!        ▼
//! ┌──────────────────────────┐ Crop / I/O error, attempts left
//! │ match → split → recognise│◀──────────────┐ (backoff)
//! └──────┬───────────────────┴───────────────┘
//!        │ record assembled         attempts exhausted ──▶ Failed
//!        ▼
//! ┌──────────────────┐ invalid ──▶ Failed
//! │ validate, persist│ write error ──▶ Failed
//! └──────┬───────────┘
//!        ▼
//!    Succeeded
//! ```
//!
//! A page that matches no template still succeeds with an empty record, and
//! a caption whose recognition fails becomes an `unknown` entry; neither
//! consumes a page attempt.

use crate::config::ExtractionConfig;
use crate::error::{LayoutError, PageError};
use crate::output::{Entry, PageOutcome, PageRecord, PageStatus, RunSummary, UNKNOWN_NAME};
use crate::pipeline::input::{layout_path, page_id, resolve_pages};
use crate::pipeline::limiter::RateLimiter;
use crate::pipeline::recognize::{
    recognize_with_retry, RecognitionBackend, RecognizedText, VisionRecognizer,
};
use crate::pipeline::select::match_page;
use crate::pipeline::split::{save_regions, split_page};
use crate::pipeline::validate::{inspect_record, validate_record, ExistingRecord};
use crate::templates::{Template, CATALOG};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Record produced by one successful page attempt.
#[derive(Debug)]
struct Analysis {
    record: PageRecord,
    template: Option<&'static str>,
}

/// Sequential page processor.
///
/// Takes `&mut self` for every page: the rate limiter inside is the only
/// mutable state and must not be shared between concurrently processed
/// pages.
pub struct Extractor<B> {
    backend: B,
    limiter: RateLimiter,
    config: ExtractionConfig,
    catalog: &'static [Template],
}

impl<B: RecognitionBackend> Extractor<B> {
    pub fn new(backend: B, config: ExtractionConfig) -> Self {
        Self {
            backend,
            limiter: RateLimiter::new(config.min_interval()),
            config,
            catalog: CATALOG,
        }
    }

    /// Replace the built-in template catalog.
    pub fn with_catalog(mut self, catalog: &'static [Template]) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Process every page in order and summarise.
    pub async fn run(&mut self, pages: &[PathBuf]) -> RunSummary {
        let start = Instant::now();
        let total = pages.len();
        info!("Processing {} page images", total);

        let callback = self.config.progress_callback.clone();
        if let Some(ref cb) = callback {
            cb.on_run_start(total);
        }

        let mut summary = RunSummary::default();
        for (index, path) in pages.iter().enumerate() {
            let outcome = self.process_indexed(index, total, path).await;
            summary.record(&outcome);
        }
        summary.total_duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Run complete: {} succeeded, {} skipped, {} failed, {}ms",
            summary.succeeded, summary.skipped, summary.failed, summary.total_duration_ms
        );
        for failure in &summary.failures {
            error!("{}", failure);
        }

        if let Some(ref cb) = callback {
            cb.on_run_complete(&summary);
        }
        summary
    }

    /// Process one page, firing the per-page progress events.
    pub async fn process_indexed(&mut self, index: usize, total: usize, path: &Path) -> PageOutcome {
        let callback = self.config.progress_callback.clone();
        if let Some(ref cb) = callback {
            cb.on_page_start(index, total, &page_id(path));
        }
        let outcome = self.process_page(path).await;
        if let Some(ref cb) = callback {
            cb.on_page_complete(index, total, &outcome);
        }
        outcome
    }

    /// Drive one page to its terminal state.
    pub async fn process_page(&mut self, path: &Path) -> PageOutcome {
        let start = Instant::now();
        let page = page_id(path);
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let record_path = layout_path(dir, path);

        match inspect_record(&record_path).await {
            ExistingRecord::Valid(_) => {
                info!("{}: valid layout already exists, skipping", page);
                return PageOutcome::skipped(page);
            }
            ExistingRecord::Invalid(reason) => {
                info!("{}: existing layout is invalid ({}), reprocessing", page, reason);
            }
            ExistingRecord::Missing => {}
        }

        let max_attempts = self.config.page_attempts.max(1);
        let mut attempt = 0;
        let analysis = loop {
            attempt += 1;
            if attempt > 1 {
                let backoff = self.config.page_backoff(attempt);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    page,
                    attempt,
                    max_attempts,
                    backoff.as_millis()
                );
                sleep(backoff).await;
            }

            match self.analyze(path, &page).await {
                Ok(analysis) => break analysis,
                Err(e) if attempt < max_attempts => {
                    warn!("{}: attempt {} failed: {}", page, attempt, e);
                }
                Err(e) => {
                    error!("{}: giving up after {} attempts: {}", page, attempt, e);
                    return PageOutcome::failed(
                        page.clone(),
                        attempt,
                        elapsed_ms(start),
                        PageError::RetriesExhausted {
                            page,
                            attempts: attempt,
                            detail: e.to_string(),
                        },
                    );
                }
            }
        };

        if let Err(e) = validate_record(&analysis.record) {
            error!("{}: generated record failed validation: {}", page, e);
            return PageOutcome::failed(
                page.clone(),
                attempt,
                elapsed_ms(start),
                PageError::InvalidRecord {
                    page,
                    detail: e.to_string(),
                },
            );
        }

        if let Err(e) = write_record(&record_path, &analysis.record).await {
            error!("{}: {}", page, e);
            return PageOutcome::failed(
                page.clone(),
                attempt,
                elapsed_ms(start),
                PageError::PersistFailed {
                    page,
                    detail: e.to_string(),
                },
            );
        }

        info!(
            "{}: {} entries saved to {}",
            page,
            analysis.record.entries.len(),
            record_path.display()
        );
        PageOutcome {
            page,
            status: PageStatus::Succeeded,
            template: analysis.template.map(str::to_string),
            entries: analysis.record.entries.len(),
            attempts: attempt,
            duration_ms: elapsed_ms(start),
            error: None,
        }
    }

    /// One attempt of match → split → recognise.
    async fn analyze(&mut self, path: &Path, page: &str) -> Result<Analysis, LayoutError> {
        let matched = match_page(path, self.catalog).await;
        let Some(template) = matched.template else {
            warn!("{}: no template matched, recording empty layout", page);
            return Ok(Analysis {
                record: PageRecord::empty(page),
                template: None,
            });
        };

        let regions = split_page(path, template).await?;
        if self.config.save_crops {
            let written = save_regions(path, &regions).await?;
            debug!("{}: {} crops saved", page, written.len());
        }

        let mut entries = Vec::with_capacity(regions.len());
        for region in &regions {
            let recognized = match recognize_with_retry(
                &self.backend,
                &mut self.limiter,
                &region.caption_png,
                &self.config,
            )
            .await
            {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        "{}: slot {} recognition failed, recording as {}: {}",
                        page, region.slot_index, UNKNOWN_NAME, e
                    );
                    RecognizedText::unknown()
                }
            };

            let name = if recognized.name.trim().is_empty() {
                UNKNOWN_NAME.to_string()
            } else {
                recognized.name
            };
            debug!("{}: slot {} → {}", page, region.slot_index, name);
            entries.push(Entry {
                name,
                photo_areas: vec![region.photo_area],
                description_areas: vec![region.caption_area],
                description_text: recognized.text,
            });
        }

        Ok(Analysis {
            record: PageRecord {
                page: page.to_string(),
                entries,
            },
            template: Some(template.code),
        })
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Write a record as pretty JSON.
///
/// Atomic: written to `<base>_layout.json.tmp`, then renamed over the target.
pub async fn write_record(path: &Path, record: &PageRecord) -> Result<(), LayoutError> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| LayoutError::Internal(format!("Failed to serialise record: {}", e)))?;

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json)
        .await
        .map_err(|e| LayoutError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| LayoutError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Extract layouts for a PNG file or a directory of PNGs.
///
/// This is the primary entry point for the library. The provider is resolved
/// from `config` and the environment.
///
/// # Errors
/// Returns `Err(LayoutError)` only for run-level problems: input not found,
/// not a PNG, unreadable directory, provider not configured. Page failures
/// are reported in the returned [`RunSummary`].
pub async fn extract_layouts(
    input: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<RunSummary, LayoutError> {
    let input = input.as_ref();
    info!("Starting layout extraction: {}", input.display());
    let pages = resolve_pages(input)?;
    if pages.is_empty() {
        warn!("No page images found in {}", input.display());
        return Ok(RunSummary::default());
    }

    let backend = VisionRecognizer::from_config(config)?;
    let mut extractor = Extractor::new(backend, config.clone());
    Ok(extractor.run(&pages).await)
}

/// Like [`extract_layouts`] with a caller-supplied recognition backend.
pub async fn extract_layouts_with<B: RecognitionBackend>(
    input: impl AsRef<Path>,
    backend: B,
    config: &ExtractionConfig,
) -> Result<RunSummary, LayoutError> {
    let pages = resolve_pages(input.as_ref())?;
    let mut extractor = Extractor::new(backend, config.clone());
    Ok(extractor.run(&pages).await)
}

/// Synchronous wrapper around [`extract_layouts`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_layouts_sync(
    input: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<RunSummary, LayoutError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| LayoutError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_layouts(input, config))
}

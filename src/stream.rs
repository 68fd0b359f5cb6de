//! Streaming extraction API: emit page outcomes as pages finish.
//!
//! Unlike the eager [`crate::extract::extract_layouts`], which returns only a
//! summary after every page, [`extract_stream`] yields each [`PageOutcome`]
//! as soon as its page reaches a terminal state. Pages are still processed
//! one at a time in input order; nothing runs until the stream is polled.

use crate::config::ExtractionConfig;
use crate::error::LayoutError;
use crate::extract::Extractor;
use crate::output::PageOutcome;
use crate::pipeline::input::resolve_pages;
use crate::pipeline::recognize::{RecognitionBackend, VisionRecognizer};
use futures::stream;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page outcomes.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = PageOutcome> + Send>>;

/// Turn an extractor and a page list into a stream of outcomes.
///
/// Per-page progress events fire as each item is produced; the run-level
/// events do not, since the stream has no natural end-of-run hook.
pub fn extract_stream<B>(extractor: Extractor<B>, pages: Vec<PathBuf>) -> OutcomeStream
where
    B: RecognitionBackend + 'static,
{
    let total = pages.len();
    let s = stream::unfold(
        (extractor, pages.into_iter().enumerate()),
        move |(mut extractor, mut remaining)| async move {
            let (index, path) = remaining.next()?;
            let outcome = extractor.process_indexed(index, total, &path).await;
            Some((outcome, (extractor, remaining)))
        },
    );
    Box::pin(s)
}

/// Resolve `input`, build the vision backend from `config` and stream the
/// outcomes.
///
/// # Returns
/// - `Ok(OutcomeStream)`: one item per page image, in file-name order
/// - `Err(LayoutError)`: input not found, not a PNG, provider not configured
pub async fn stream_layouts(
    input: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<OutcomeStream, LayoutError> {
    let input = input.as_ref();
    info!("Starting streaming extraction: {}", input.display());

    let pages = resolve_pages(input)?;
    let backend = VisionRecognizer::from_config(config)?;
    Ok(extract_stream(Extractor::new(backend, config.clone()), pages))
}

//! Output types: page records, per-page outcomes and the run summary.
//!
//! [`PageRecord`] is the unit persisted as `<base>_layout.json` and re-loaded
//! for skip-on-existing checks. Its serde names are the on-disk schema shared
//! with the flashcard tooling (`plants`, `photoAreas`, `descriptionAreas`,
//! `descriptionText`), so they must not change.

use crate::error::PageError;
use serde::{Deserialize, Serialize};

/// Name recorded for an entry whose caption could not be recognised.
pub const UNKNOWN_NAME: &str = "unknown";

/// Axis-aligned pixel rectangle, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge, `None` on overflow.
    pub fn right(&self) -> Option<u32> {
        self.x.checked_add(self.width)
    }

    /// Exclusive bottom edge, `None` on overflow.
    pub fn bottom(&self) -> Option<u32> {
        self.y.checked_add(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when the rectangle is non-empty and lies inside a `width × height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        !self.is_empty()
            && self.right().is_some_and(|r| r <= width)
            && self.bottom().is_some_and(|b| b <= height)
    }
}

/// One recognised catalog entry on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Recognised entry name, or [`UNKNOWN_NAME`].
    pub name: String,
    pub photo_areas: Vec<Rect>,
    pub description_areas: Vec<Rect>,
    /// Full caption text; empty when recognition failed.
    #[serde(default)]
    pub description_text: String,
}

impl Entry {
    /// Entry for a caption whose recognition failed.
    pub fn unknown(photo: Rect, caption: Rect) -> Self {
        Self {
            name: UNKNOWN_NAME.to_string(),
            photo_areas: vec![photo],
            description_areas: vec![caption],
            description_text: String::new(),
        }
    }
}

/// The persisted result of classifying and recognising one page image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Page identifier: the image file name.
    pub page: String,
    /// Entries in template slot order.
    #[serde(rename = "plants")]
    pub entries: Vec<Entry>,
}

impl PageRecord {
    /// Degraded record for a page that matched no template.
    pub fn empty(page: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            entries: Vec::new(),
        }
    }
}

/// Terminal state of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Succeeded,
    Skipped,
    Failed,
}

/// What happened to one page during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageOutcome {
    /// Page identifier (file name).
    pub page: String,
    pub status: PageStatus,
    /// Code of the matched template, if any.
    pub template: Option<String>,
    /// Number of entries in the persisted record.
    pub entries: usize,
    /// Attempts spent on the match/split/recognise sequence (0 when skipped).
    pub attempts: u32,
    pub duration_ms: u64,
    pub error: Option<PageError>,
}

impl PageOutcome {
    pub fn skipped(page: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            status: PageStatus::Skipped,
            template: None,
            entries: 0,
            attempts: 0,
            duration_ms: 0,
            error: None,
        }
    }

    pub fn failed(page: impl Into<String>, attempts: u32, duration_ms: u64, error: PageError) -> Self {
        Self {
            page: page.into(),
            status: PageStatus::Failed,
            template: None,
            entries: 0,
            attempts,
            duration_ms,
            error: Some(error),
        }
    }
}

/// Aggregate counts for a run over many pages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_pages: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Every page failure, in processing order.
    pub failures: Vec<PageError>,
    pub total_duration_ms: u64,
}

impl RunSummary {
    /// Fold one page outcome into the counts.
    pub fn record(&mut self, outcome: &PageOutcome) {
        self.total_pages += 1;
        match outcome.status {
            PageStatus::Succeeded => self.succeeded += 1,
            PageStatus::Skipped => self.skipped += 1,
            PageStatus::Failed => {
                self.failed += 1;
                if let Some(ref e) = outcome.error {
                    self.failures.push(e.clone());
                }
            }
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

//! Input resolution: turn a user-supplied file or directory into the ordered
//! list of page images, and derive every sibling output path from a page.
//!
//! The engine writes its outputs next to the pages (`<base>_layout.json`,
//! crop PNGs, overlay PNGs). Those derived PNGs live in the same directory as
//! the scans, so directory listing has to drop them; otherwise a second run
//! would treat yesterday's crops as new pages.

use crate::error::LayoutError;
use crate::pipeline::split::RegionKind;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix of the persisted page record, without extension.
pub const LAYOUT_SUFFIX: &str = "_layout";

static RE_CROP_STEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_\d+_(?:photo|caption)$").unwrap());

/// True when `path` has a `.png` extension (any case).
pub fn is_png(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("png"))
}

/// True for PNGs this crate produced itself (overlays and crops).
pub fn is_derived_artifact(path: &Path) -> bool {
    let stem = file_stem(path);
    stem.ends_with(LAYOUT_SUFFIX) || RE_CROP_STEM.is_match(&stem)
}

/// Page identifier: the image's file name.
pub fn page_id(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `<dir>/<base>_layout.json` for the page at `image`.
pub fn layout_path(dir: &Path, image: &Path) -> PathBuf {
    dir.join(format!("{}{}.json", file_stem(image), LAYOUT_SUFFIX))
}

/// `<dir>/<base>_layout.png` for the page at `image`.
pub fn overlay_path(dir: &Path, image: &Path) -> PathBuf {
    dir.join(format!("{}{}.png", file_stem(image), LAYOUT_SUFFIX))
}

/// `<base>_<slot>_<kind>.png` next to the page at `image`.
pub fn crop_path(image: &Path, slot: usize, kind: RegionKind) -> PathBuf {
    let dir = image.parent().unwrap_or_else(|| Path::new(""));
    dir.join(format!("{}_{}_{}.png", file_stem(image), slot, kind.as_str()))
}

/// Resolve the input to the ordered list of page images.
///
/// A file must be a PNG. A directory yields its PNGs minus derived artefacts,
/// sorted by file name.
pub fn resolve_pages(input: &Path) -> Result<Vec<PathBuf>, LayoutError> {
    let meta = std::fs::metadata(input).map_err(|_| LayoutError::InputNotFound {
        path: input.to_path_buf(),
    })?;

    if meta.is_file() {
        if !is_png(input) {
            return Err(LayoutError::NotAPng {
                path: input.to_path_buf(),
            });
        }
        return Ok(vec![input.to_path_buf()]);
    }

    let entries = std::fs::read_dir(input).map_err(|e| LayoutError::ReadDirFailed {
        path: input.to_path_buf(),
        source: e,
    })?;

    let mut pages = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| LayoutError::ReadDirFailed {
            path: input.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_file() && is_png(&path) && !is_derived_artifact(&path) {
            pages.push(path);
        }
    }
    pages.sort();

    debug!("Resolved {} page images in {}", pages.len(), input.display());
    Ok(pages)
}

/// Directory that holds sibling outputs for `input` (the input itself when it
/// is a directory, its parent when it is a file).
pub fn output_dir(input: &Path) -> PathBuf {
    if input.is_dir() {
        input.to_path_buf()
    } else {
        input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

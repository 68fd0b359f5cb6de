//! Region splitting: crop each template slot into photo and caption images.
//!
//! Unlike template mismatch, a crop failure after a successful match means
//! the template and the image disagree about page geometry, so it is
//! surfaced as [`LayoutError::Crop`] and fails the page attempt.

use crate::error::LayoutError;
use crate::output::Rect;
use crate::pipeline::input::crop_path;
use crate::templates::Template;
use image::DynamicImage;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Which half of a slot a crop belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Photo,
    Caption,
}

impl RegionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionKind::Photo => "photo",
            RegionKind::Caption => "caption",
        }
    }
}

/// One slot cut into its photo and caption crops.
#[derive(Debug, Clone)]
pub struct SplitRegion {
    pub slot_index: usize,
    pub slot: Rect,
    pub photo_area: Rect,
    pub caption_area: Rect,
    /// PNG-encoded photo crop.
    pub photo_png: Vec<u8>,
    /// PNG-encoded caption crop.
    pub caption_png: Vec<u8>,
}

/// Crop `rect` out of `img` and encode it as PNG.
pub fn crop_png(
    img: &DynamicImage,
    rect: &Rect,
    slot: usize,
    kind: RegionKind,
) -> Result<Vec<u8>, LayoutError> {
    if !rect.fits_within(img.width(), img.height()) {
        return Err(LayoutError::Crop {
            slot,
            region: kind.as_str(),
            detail: format!(
                "rectangle {:?} exceeds image bounds {}x{}",
                rect,
                img.width(),
                img.height()
            ),
        });
    }

    let cropped = img.crop_imm(rect.x, rect.y, rect.width, rect.height);
    let mut buf = Vec::new();
    cropped
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| LayoutError::Crop {
            slot,
            region: kind.as_str(),
            detail: format!("PNG encoding failed: {}", e),
        })?;
    Ok(buf)
}

/// Split a decoded page according to `template`, in slot order.
pub fn split_image(img: &DynamicImage, template: &Template) -> Result<Vec<SplitRegion>, LayoutError> {
    template
        .slots
        .iter()
        .enumerate()
        .map(|(slot_index, slot)| {
            let photo_area = template.photo_rect(slot);
            let caption_area = template.caption_rect(slot);
            let photo_png = crop_png(img, &photo_area, slot_index, RegionKind::Photo)?;
            let caption_png = crop_png(img, &caption_area, slot_index, RegionKind::Caption)?;
            debug!(
                "Slot {} split: photo={}x{}, caption={}x{}",
                slot_index,
                photo_area.width,
                photo_area.height,
                caption_area.width,
                caption_area.height
            );
            Ok(SplitRegion {
                slot_index,
                slot: *slot,
                photo_area,
                caption_area,
                photo_png,
                caption_png,
            })
        })
        .collect()
}

/// Load a page image from disk and split it, off the async runtime.
pub async fn split_page(
    path: &Path,
    template: &'static Template,
) -> Result<Vec<SplitRegion>, LayoutError> {
    let path = path.to_path_buf();
    let regions = tokio::task::spawn_blocking(move || {
        let img = image::open(&path).map_err(|e| LayoutError::ImageDecode {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        split_image(&img, template)
    })
    .await
    .map_err(|e| LayoutError::Internal(format!("Split task panicked: {}", e)))??;

    info!(
        "Split with {}: {} slots processed",
        template.code,
        regions.len()
    );
    Ok(regions)
}

/// Write every crop next to the source image for auditing.
///
/// Files are named `<base>_<slot>_photo.png` / `<base>_<slot>_caption.png`.
pub async fn save_regions(
    source: &Path,
    regions: &[SplitRegion],
) -> Result<Vec<PathBuf>, LayoutError> {
    let mut written = Vec::with_capacity(regions.len() * 2);
    for region in regions {
        for (kind, bytes) in [
            (RegionKind::Photo, &region.photo_png),
            (RegionKind::Caption, &region.caption_png),
        ] {
            let path = crop_path(source, region.slot_index, kind);
            tokio::fs::write(&path, bytes)
                .await
                .map_err(|e| LayoutError::OutputWriteFailed {
                    path: path.clone(),
                    source: e,
                })?;
            debug!("Crop saved to: {}", path.display());
            written.push(path);
        }
    }
    Ok(written)
}

//! Layout review images.
//!
//! For every page image, draws the persisted record on top of the page:
//! photo areas outlined in green, description areas in blue, each entry's
//! name on a white tag above its first area. A page whose record is missing
//! or invalid gets a red band across its middle carrying the reason instead,
//! so bad pages stand out when flipping through the output.
//!
//! Text needs a TrueType font. One is looked up from `--font` or common
//! system locations; without one, boxes and the band are drawn bare.
//!
//! Output goes to `<base>_layout.png`. That name is excluded from page
//! discovery, so overlays never feed back into extraction.

use crate::error::LayoutError;
use crate::output::{PageRecord, Rect};
use crate::pipeline::input::{layout_path, overlay_path, page_id, resolve_pages};
use crate::pipeline::validate::{inspect_record, ExistingRecord};
use ab_glyph::FontVec;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const PHOTO_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
pub const DESCRIPTION_COLOR: Rgba<u8> = Rgba([0, 0, 255, 255]);
pub const ERROR_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const LABEL_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
pub const LABEL_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const ERROR_TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const LINE_WIDTH: u32 = 3;
const ERROR_BAND_HEIGHT: u32 = 80;
const FONT_SIZE: f32 = 24.0;
const LABEL_PADDING: i32 = 5;
/// Gap between a label tag and the top of the box it names.
const LABEL_GAP: i32 = 10;
const ERROR_MARGIN: u32 = 20;

/// Searched in order; CJK fonts first so Japanese names render.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/System/Library/Fonts/ヒラギノ角ゴシック W3.ttc",
    "C:\\Windows\\Fonts\\meiryo.ttc",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Why a page's overlay shows the error band (or was not written).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayIssue {
    /// No `<base>_layout.json` next to the page.
    JsonMissing,
    /// The record exists but fails structural validation.
    JsonInvalid,
    /// The page image itself could not be read or the overlay not written.
    ImageError,
}

/// What to draw on one page.
#[derive(Debug, Clone)]
pub enum OverlayContent {
    Layout(PageRecord),
    /// Red band with this message.
    Error(String),
}

/// Where to look for records and where to write overlays.
///
/// Both directories default to the input directory.
#[derive(Debug, Clone, Default)]
pub struct OverlayOptions {
    pub layout_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    /// Font file for labels; system fonts are tried when unset or unreadable.
    pub font_path: Option<PathBuf>,
}

/// Counts for one overlay run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OverlaySummary {
    pub total: usize,
    /// Pages drawn from a valid record.
    pub rendered: usize,
    /// Pages with an issue (band drawn, or nothing written for image errors).
    pub with_issues: usize,
    pub issues: BTreeMap<OverlayIssue, usize>,
    pub outputs: Vec<PathBuf>,
}

impl OverlaySummary {
    fn note_issue(&mut self, issue: OverlayIssue) {
        self.with_issues += 1;
        *self.issues.entry(issue).or_insert(0) += 1;
    }
}

fn read_font(path: &Path) -> Option<FontVec> {
    let data = std::fs::read(path).ok()?;
    FontVec::try_from_vec(data).ok()
}

/// Load `explicit` if given and usable, else the first system font found.
pub fn load_font(explicit: Option<&Path>) -> Option<FontVec> {
    if let Some(path) = explicit {
        match read_font(path) {
            Some(font) => return Some(font),
            None => warn!("Cannot load font {}, trying system fonts", path.display()),
        }
    }
    for path in SYSTEM_FONTS {
        if let Some(font) = read_font(Path::new(path)) {
            info!("Loaded system font: {}", path);
            return Some(font);
        }
    }
    debug!("No system font found, overlay text will be skipped");
    None
}

/// Outline `rect` with a [`LINE_WIDTH`]-pixel border centred on its edge.
fn draw_box(img: &mut RgbaImage, rect: &Rect, color: Rgba<u8>) {
    let half = (LINE_WIDTH / 2) as i32;
    for i in 0..LINE_WIDTH {
        let grow = half - i as i32;
        let w = rect.width as i64 + 2 * grow as i64;
        let h = rect.height as i64 + 2 * grow as i64;
        if w <= 0 || h <= 0 {
            continue;
        }
        let r = imageproc::rect::Rect::at(rect.x as i32 - grow, rect.y as i32 - grow)
            .of_size(w as u32, h as u32);
        draw_hollow_rect_mut(img, r, color);
    }
}

/// Name tag above `area`: white background, black text, clamped to the top edge.
fn draw_label(img: &mut RgbaImage, font: &FontVec, name: &str, area: &Rect) {
    let (text_width, _) = text_size(FONT_SIZE, font, name);
    let x = area.x as i32;
    let y = (area.y as i32 - FONT_SIZE as i32 - LABEL_GAP).max(0);
    let pad = LABEL_PADDING as u32;
    draw_filled_rect_mut(
        img,
        imageproc::rect::Rect::at(x - LABEL_PADDING, y - LABEL_PADDING)
            .of_size(text_width + 2 * pad, FONT_SIZE as u32 + 2 * pad),
        LABEL_BACKGROUND,
    );
    draw_text_mut(img, LABEL_COLOR, x, y, FONT_SIZE, font, name);
}

/// Draw every area of `record` onto `img`, plus name tags when a font is given.
pub fn draw_layout(img: &mut RgbaImage, record: &PageRecord, font: Option<&FontVec>) {
    for entry in &record.entries {
        for area in &entry.photo_areas {
            draw_box(img, area, PHOTO_COLOR);
        }
        for area in &entry.description_areas {
            draw_box(img, area, DESCRIPTION_COLOR);
        }
        let anchor = entry
            .photo_areas
            .first()
            .or_else(|| entry.description_areas.first());
        if let (Some(font), Some(area)) = (font, anchor) {
            draw_label(img, font, &entry.name, area);
        }
    }
}

/// Greedy word wrap to `max_width` pixels. A single word wider than the
/// limit gets a line of its own.
pub fn wrap_text(font: &FontVec, text: &str, max_width: u32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if !current.is_empty() && text_size(FONT_SIZE, font, &candidate).0 > max_width {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Fill a full-width band across the vertical middle of `img` and, with a
/// font, centre `message` on it.
pub fn draw_error_band(img: &mut RgbaImage, message: &str, font: Option<&FontVec>) {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let band = ERROR_BAND_HEIGHT.min(height);
    let y = (height - band) / 2;
    draw_filled_rect_mut(
        img,
        imageproc::rect::Rect::at(0, y as i32).of_size(width, band),
        ERROR_COLOR,
    );

    let Some(font) = font else {
        return;
    };
    let lines = wrap_text(font, message, width.saturating_sub(2 * ERROR_MARGIN));
    let line_height = FONT_SIZE as i32 + 5;
    let start_y = height as i32 / 2 - (lines.len() as i32 * line_height) / 2;
    for (i, line) in lines.iter().enumerate() {
        let (line_width, _) = text_size(FONT_SIZE, font, line);
        let x = (width as i32 - line_width as i32) / 2;
        draw_text_mut(
            img,
            ERROR_TEXT_COLOR,
            x.max(0),
            start_y + i as i32 * line_height,
            FONT_SIZE,
            font,
            line,
        );
    }
}

/// Render one overlay image. Blocking.
pub fn render_overlay(
    image_path: &Path,
    content: &OverlayContent,
    output_path: &Path,
    font: Option<&FontVec>,
) -> Result<(), LayoutError> {
    let mut img = image::open(image_path)
        .map_err(|e| LayoutError::ImageDecode {
            path: image_path.to_path_buf(),
            detail: e.to_string(),
        })?
        .to_rgba8();

    match content {
        OverlayContent::Layout(record) => draw_layout(&mut img, record, font),
        OverlayContent::Error(message) => draw_error_band(&mut img, message, font),
    }

    img.save(output_path).map_err(|e| LayoutError::OutputWriteFailed {
        path: output_path.to_path_buf(),
        source: std::io::Error::other(e.to_string()),
    })
}

/// Load the record for `image` from `layout_dir`, classifying failures with
/// the message printed on the band.
async fn load_for_overlay(
    layout_dir: &Path,
    image: &Path,
) -> Result<PageRecord, (OverlayIssue, String)> {
    let path = layout_path(layout_dir, image);
    let file = page_id(&path);
    match inspect_record(&path).await {
        ExistingRecord::Missing => Err((
            OverlayIssue::JsonMissing,
            format!("Layout file not found: {file}"),
        )),
        ExistingRecord::Invalid(_) => Err((
            OverlayIssue::JsonInvalid,
            format!("Invalid layout file: {file}"),
        )),
        ExistingRecord::Valid(value) => serde_json::from_value(value).map_err(|e| {
            (
                OverlayIssue::JsonInvalid,
                format!("Failed to load layout file: {e}"),
            )
        }),
    }
}

/// Generate overlays for a PNG file or every page PNG in a directory.
///
/// # Errors
/// Only input resolution and output-directory creation abort the run; page
/// problems are counted in the returned [`OverlaySummary`].
pub async fn generate_overlays(
    input: &Path,
    options: &OverlayOptions,
) -> Result<OverlaySummary, LayoutError> {
    let pages = resolve_pages(input)?;
    let input_dir = crate::pipeline::input::output_dir(input);
    let layout_dir = options.layout_dir.clone().unwrap_or_else(|| input_dir.clone());
    let output_dir = options.output_dir.clone().unwrap_or(input_dir);

    tokio::fs::create_dir_all(&output_dir)
        .await
        .map_err(|e| LayoutError::OutputWriteFailed {
            path: output_dir.clone(),
            source: e,
        })?;

    let font_path = options.font_path.clone();
    let font = tokio::task::spawn_blocking(move || load_font(font_path.as_deref()))
        .await
        .map_err(|e| LayoutError::Internal(format!("Font task panicked: {}", e)))?
        .map(Arc::new);

    info!("Generating overlays for {} pages", pages.len());
    let mut summary = OverlaySummary {
        total: pages.len(),
        ..Default::default()
    };

    for image in pages {
        let page = page_id(&image);
        let loaded = load_for_overlay(&layout_dir, &image).await;
        let output = overlay_path(&output_dir, &image);

        let (content, issue) = match loaded {
            Ok(record) => (OverlayContent::Layout(record), None),
            Err((issue, message)) => {
                warn!("{}: {}, drawing error band", page, message);
                (OverlayContent::Error(message), Some(issue))
            }
        };

        let (src, dst, font) = (image.clone(), output.clone(), font.clone());
        let rendered = tokio::task::spawn_blocking(move || {
            render_overlay(&src, &content, &dst, font.as_deref())
        })
        .await
        .map_err(|e| LayoutError::Internal(format!("Overlay task panicked: {}", e)))?;

        match (rendered, issue) {
            (Err(e), _) => {
                warn!("{}: overlay failed: {}", page, e);
                summary.note_issue(OverlayIssue::ImageError);
            }
            (Ok(()), None) => {
                debug!("{}: overlay saved to {}", page, output.display());
                summary.rendered += 1;
                summary.outputs.push(output);
            }
            (Ok(()), Some(issue)) => {
                summary.note_issue(issue);
                summary.outputs.push(output);
            }
        }
    }

    info!(
        "Overlays complete: {} rendered, {} with issues of {}",
        summary.rendered, summary.with_issues, summary.total
    );
    if summary.with_issues > 0 {
        info!("Issue breakdown: {:?}", summary.issues);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Entry;

    fn white(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]))
    }

    #[test]
    fn boxes_are_three_pixels_wide() {
        let mut img = white(40, 40);
        let record = PageRecord {
            page: "p.png".into(),
            entries: vec![Entry::unknown(Rect::new(10, 10, 10, 10), Rect::new(25, 10, 10, 10))],
        };
        draw_layout(&mut img, &record, None);

        // Border centred on x = 10: columns 9, 10, 11.
        for x in 9..=11 {
            assert_eq!(img.get_pixel(x, 15), &PHOTO_COLOR, "column {x}");
        }
        assert_eq!(img.get_pixel(8, 15), &Rgba([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(15, 15), &Rgba([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(25, 15), &DESCRIPTION_COLOR);
    }

    #[test]
    fn error_band_spans_the_middle() {
        let mut img = white(20, 200);
        draw_error_band(&mut img, "Layout file not found: p_layout.json", None);
        assert_eq!(img.get_pixel(0, 60), &ERROR_COLOR);
        assert_eq!(img.get_pixel(19, 139), &ERROR_COLOR);
        assert_eq!(img.get_pixel(0, 59), &Rgba([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(0, 140), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn unreadable_font_path_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("not-a-font.ttf");
        std::fs::write(&bogus, b"garbage").unwrap();
        // Same outcome as no explicit font at all.
        assert_eq!(load_font(Some(&bogus)).is_some(), load_font(None).is_some());
    }

    #[test]
    fn label_sits_above_the_photo_area() {
        let Some(font) = load_font(None) else {
            println!("SKIP: no system font");
            return;
        };
        let grey = Rgba([128, 128, 128, 255]);
        let mut img = RgbaImage::from_pixel(300, 200, grey);
        let record = PageRecord {
            page: "p.png".into(),
            entries: vec![Entry {
                name: "Iris".into(),
                photo_areas: vec![Rect::new(20, 80, 100, 100)],
                description_areas: vec![Rect::new(150, 80, 100, 100)],
                description_text: String::new(),
            }],
        };
        draw_layout(&mut img, &record, Some(&font));

        // Tag spans y = 80 - 24 - 10 - 5 ..= 80 - 10 + 5 - 1.
        assert_eq!(img.get_pixel(16, 42), &LABEL_BACKGROUND);
        let dark = (41..70)
            .flat_map(|y| (20..120).map(move |x| (x, y)))
            .any(|(x, y)| img.get_pixel(x, y)[0] < 100);
        assert!(dark, "no text pixels in the label");
        // Nothing above the description area.
        assert_eq!(img.get_pixel(160, 50), &grey);
    }

    #[test]
    fn error_message_is_written_on_the_band() {
        let Some(font) = load_font(None) else {
            println!("SKIP: no system font");
            return;
        };
        let mut img = white(400, 200);
        draw_error_band(&mut img, "Invalid layout file: p_layout.json", Some(&font));
        let band = (60..140).flat_map(|y| (0..400).map(move |x| (x, y)));
        let text = band
            .filter(|&(x, y)| {
                let p = img.get_pixel(x, y);
                p[1] > 128 && p[2] > 128
            })
            .count();
        assert!(text > 0, "no text pixels on the band");
        assert_eq!(img.get_pixel(2, 100), &ERROR_COLOR);
    }

    #[test]
    fn long_messages_wrap_within_the_width() {
        let Some(font) = load_font(None) else {
            println!("SKIP: no system font");
            return;
        };
        let message = "Failed to load layout file: invalid type: floating point `848.5`, expected u32";
        let lines = wrap_text(&font, message, 200);
        assert!(lines.len() > 1);
        assert_eq!(lines.join(" "), message);
        for line in &lines {
            if line.contains(' ') {
                assert!(text_size(FONT_SIZE, &font, line).0 <= 200, "{line}");
            }
        }
    }

    #[tokio::test]
    async fn band_messages_name_the_problem() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("p.png");

        let missing = load_for_overlay(dir.path(), &page).await.unwrap_err();
        assert_eq!(missing.0, OverlayIssue::JsonMissing);
        assert_eq!(missing.1, "Layout file not found: p_layout.json");

        std::fs::write(dir.path().join("p_layout.json"), "{").unwrap();
        let invalid = load_for_overlay(dir.path(), &page).await.unwrap_err();
        assert_eq!(invalid.0, OverlayIssue::JsonInvalid);
        assert_eq!(invalid.1, "Invalid layout file: p_layout.json");

        let mut value = serde_json::to_value(PageRecord {
            page: "p.png".into(),
            entries: vec![Entry::unknown(Rect::new(5, 5, 10, 10), Rect::new(20, 5, 10, 10))],
        })
        .unwrap();
        value["plants"][0]["photoAreas"][0]["x"] = serde_json::json!(5.5);
        std::fs::write(dir.path().join("p_layout.json"), value.to_string()).unwrap();
        let (issue, message) = load_for_overlay(dir.path(), &page).await.unwrap_err();
        assert_eq!(issue, OverlayIssue::JsonInvalid);
        assert!(message.starts_with("Failed to load layout file: "), "{message}");
    }

    #[tokio::test]
    async fn summary_classifies_pages() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.png", "c.png"] {
            white(50, 50).save(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("d.png"), b"not a png").unwrap();

        let good = PageRecord {
            page: "a.png".into(),
            entries: vec![Entry::unknown(Rect::new(5, 5, 10, 10), Rect::new(20, 5, 10, 10))],
        };
        std::fs::write(
            dir.path().join("a_layout.json"),
            serde_json::to_string(&good).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("b_layout.json"), r#"{"page": "b.png"}"#).unwrap();
        std::fs::write(
            dir.path().join("d_layout.json"),
            serde_json::to_string(&PageRecord::empty("d.png")).unwrap(),
        )
        .unwrap();

        let out = dir.path().join("review");
        let summary = generate_overlays(
            dir.path(),
            &OverlayOptions {
                layout_dir: None,
                output_dir: Some(out.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(summary.total, 4);
        assert_eq!(summary.rendered, 1);
        assert_eq!(summary.with_issues, 3);
        assert_eq!(summary.issues[&OverlayIssue::JsonInvalid], 1);
        assert_eq!(summary.issues[&OverlayIssue::JsonMissing], 1);
        assert_eq!(summary.issues[&OverlayIssue::ImageError], 1);

        assert!(out.join("a_layout.png").exists());
        assert!(out.join("b_layout.png").exists());
        assert!(out.join("c_layout.png").exists());
        assert!(!out.join("d_layout.png").exists());

        let banded = image::open(out.join("c_layout.png")).unwrap().to_rgba8();
        assert_eq!(banded.get_pixel(25, 25), &ERROR_COLOR);
    }
}

//! Template catalog: the fixed set of page layouts the engine recognises.
//!
//! Every template is a hypothesis about where the entry slots sit on a page
//! and how each slot divides into a photo span and a caption span. Pages are
//! scanned at a fixed resolution (≈1600×2000 px), so coordinates are absolute.
//! Odd and even pages mirror each other: odd pages put the caption on the
//! left of the slot, even pages on the right.

use crate::output::Rect;

/// Intensity above which an inverted-greyscale pixel counts as an edge.
pub const EDGE_INTENSITY_THRESHOLD: u8 = 10;

/// Highest template score that is still accepted as a match.
///
/// Scores strictly greater than this are rejected.
pub const ACCEPTANCE_THRESHOLD: f64 = 0.05;

/// Horizontal span inside a slot, relative to the slot's left edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub offset: u32,
    pub width: u32,
}

impl Section {
    pub const fn new(offset: u32, width: u32) -> Self {
        Self { offset, width }
    }

    /// Project this span onto `slot`, keeping the slot's full height.
    pub fn within(&self, slot: &Rect) -> Rect {
        Rect::new(
            slot.x.saturating_add(self.offset),
            slot.y,
            self.width,
            slot.height,
        )
    }
}

/// A named geometric page layout.
#[derive(Debug, PartialEq, Eq)]
pub struct Template {
    /// Unique template code, e.g. `ODD_3ROWS`.
    pub code: &'static str,
    /// Slot rectangles in reading order.
    pub slots: &'static [Rect],
    pub photo: Section,
    pub caption: Section,
}

impl Template {
    pub fn photo_rect(&self, slot: &Rect) -> Rect {
        self.photo.within(slot)
    }

    pub fn caption_rect(&self, slot: &Rect) -> Rect {
        self.caption.within(slot)
    }
}

/// Odd page, three entries, caption left / photo right.
pub const ODD_3ROWS: Template = Template {
    code: "ODD_3ROWS",
    slots: &[
        Rect::new(240, 119, 1110, 567),
        Rect::new(240, 702, 1110, 577),
        Rect::new(240, 1298, 1110, 573),
    ],
    photo: Section::new(608, 502),
    caption: Section::new(0, 608),
};

/// Even page, three entries, photo left / caption right.
pub const EVEN_3ROWS: Template = Template {
    code: "EVEN_3ROWS",
    slots: &[
        Rect::new(308, 113, 1096, 577),
        Rect::new(308, 708, 1096, 569),
        Rect::new(308, 1297, 1096, 569),
    ],
    photo: Section::new(0, 483),
    caption: Section::new(483, 613),
};

/// Odd page, two tall entries, caption left / photo right.
pub const ODD_2ROWS: Template = Template {
    code: "ODD_2ROWS",
    slots: &[
        Rect::new(230, 115, 1096, 843),
        Rect::new(230, 1004, 1096, 843),
    ],
    photo: Section::new(638, 458),
    caption: Section::new(0, 638),
};

/// The catalog in registration order. Earlier templates win score ties.
pub static CATALOG: &[Template] = &[ODD_3ROWS, EVEN_3ROWS, ODD_2ROWS];

/// Look up a template by code.
pub fn find(code: &str) -> Option<&'static Template> {
    CATALOG.iter().find(|t| t.code == code)
}

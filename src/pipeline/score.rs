//! Boundary-mismatch scoring of one template against an edge map.
//!
//! For each slot the four border lines are sampled and the fraction of edge
//! pixels is computed. A template whose borders fall on blank dividers scores
//! near 0; one whose borders cut through text or photos scores high.
//!
//! Corner pixels are sampled once by the horizontal pass and once by the
//! vertical pass, and a 1-pixel-tall slot samples its single row twice. The
//! acceptance threshold was tuned with this counting, so keep it.

use crate::output::Rect;
use crate::pipeline::edges::EdgeMap;
use crate::templates::{Template, EDGE_INTENSITY_THRESHOLD};

/// Edge and sample counts along one slot's border.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BorderCounts {
    pub edges: u64,
    pub samples: u64,
}

impl BorderCounts {
    fn sample(&mut self, value: u8) {
        self.samples += 1;
        if value > EDGE_INTENSITY_THRESHOLD {
            self.edges += 1;
        }
    }

    /// Fraction of edge samples, 0 when nothing was sampled.
    pub fn ratio(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.edges as f64 / self.samples as f64
        }
    }
}

/// Count edge pixels on the four borders of `slot`, clipped to the map.
pub fn border_counts(edges: &EdgeMap, slot: &Rect) -> BorderCounts {
    let mut counts = BorderCounts::default();
    let (w, h) = (edges.width(), edges.height());

    let x_end = slot.x.saturating_add(slot.width).min(w);
    let y_end = slot.y.saturating_add(slot.height).min(h);
    let bottom = slot.y.saturating_add(slot.height).checked_sub(1);
    let right = slot.x.saturating_add(slot.width).checked_sub(1);

    for x in slot.x..x_end {
        if let Some(v) = edges.get(x, slot.y) {
            counts.sample(v);
        }
        if let Some(v) = bottom.and_then(|y| edges.get(x, y)) {
            counts.sample(v);
        }
    }

    for y in slot.y..y_end {
        if let Some(v) = edges.get(slot.x, y) {
            counts.sample(v);
        }
        if let Some(v) = right.and_then(|x| edges.get(x, y)) {
            counts.sample(v);
        }
    }

    counts
}

/// Per-slot score: edge fraction along the slot border.
pub fn slot_score(edges: &EdgeMap, slot: &Rect) -> f64 {
    border_counts(edges, slot).ratio()
}

/// Template score: mean of slot scores, summed in slot order.
///
/// Returns 0 for a template without slots.
pub fn template_score(edges: &EdgeMap, template: &Template) -> f64 {
    if template.slots.is_empty() {
        return 0.0;
    }
    let total: f64 = template
        .slots
        .iter()
        .map(|slot| slot_score(edges, slot))
        .fold(0.0, |acc, s| acc + s);
    total / template.slots.len() as f64
}

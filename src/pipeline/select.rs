//! Template selection: score every template, keep the lowest, apply the
//! acceptance threshold.
//!
//! Classification failure is an expected outcome, not an error: an
//! undecodable image or a page whose best score is above the threshold both
//! yield a [`MatchResult`] without a template, and the orchestrator records a
//! degraded page instead of failing it.

use crate::pipeline::edges::{load_edge_map, EdgeMap};
use crate::pipeline::score::template_score;
use crate::templates::{Template, ACCEPTANCE_THRESHOLD};
use std::path::Path;
use tracing::{debug, info, warn};

/// Score of one template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateScore<'a> {
    pub template: &'a Template,
    pub score: f64,
}

/// Outcome of template selection.
#[derive(Debug, Clone, Copy)]
pub struct MatchResult<'a> {
    /// The accepted template, `None` when nothing matched.
    pub template: Option<&'a Template>,
    /// Lowest score seen, `None` when the image could not be scored at all.
    pub score: Option<f64>,
}

impl<'a> MatchResult<'a> {
    pub fn no_match(score: Option<f64>) -> Self {
        Self {
            template: None,
            score,
        }
    }

    pub fn is_match(&self) -> bool {
        self.template.is_some()
    }
}

/// Score every template and sort ascending.
///
/// The sort is stable, so templates with equal scores keep catalog order.
pub fn rank<'a>(edges: &EdgeMap, catalog: &'a [Template]) -> Vec<TemplateScore<'a>> {
    let mut scores: Vec<TemplateScore<'a>> = catalog
        .iter()
        .map(|template| {
            let score = template_score(edges, template);
            debug!("Template {}: score = {}", template.code, score);
            TemplateScore { template, score }
        })
        .collect();
    scores.sort_by(|a, b| a.score.total_cmp(&b.score));
    scores
}

/// Pick the best of already-computed scores (given in catalog order).
///
/// A score equal to the threshold is accepted; anything above is rejected.
pub fn select<'a>(mut scores: Vec<TemplateScore<'a>>) -> MatchResult<'a> {
    scores.sort_by(|a, b| a.score.total_cmp(&b.score));
    let Some(best) = scores.first().copied() else {
        return MatchResult::no_match(None);
    };

    if best.score > ACCEPTANCE_THRESHOLD {
        warn!(
            "No template matched below threshold {}. Best: {} ({})",
            ACCEPTANCE_THRESHOLD, best.template.code, best.score
        );
        return MatchResult::no_match(Some(best.score));
    }

    info!(
        "Template matched: {} (score: {})",
        best.template.code, best.score
    );
    MatchResult {
        template: Some(best.template),
        score: Some(best.score),
    }
}

/// Select the best template for an edge map.
pub fn match_template<'a>(edges: &EdgeMap, catalog: &'a [Template]) -> MatchResult<'a> {
    select(rank(edges, catalog))
}

/// Load a page image and select its template.
///
/// Decode failures are logged and reported as "no match".
pub async fn match_page<'a>(path: &Path, catalog: &'a [Template]) -> MatchResult<'a> {
    match load_edge_map(path).await {
        Ok(edges) => match_template(&edges, catalog),
        Err(e) => {
            warn!("Pattern matching failed for {}: {}", path.display(), e);
            MatchResult::no_match(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Rect;
    use crate::templates::{Section, CATALOG, EVEN_3ROWS, ODD_2ROWS, ODD_3ROWS};

    const A: Template = Template {
        code: "A",
        slots: &[Rect::new(0, 0, 10, 10)],
        photo: Section::new(0, 5),
        caption: Section::new(5, 5),
    };
    const B: Template = Template {
        code: "B",
        slots: &[Rect::new(2, 2, 6, 6)],
        photo: Section::new(0, 3),
        caption: Section::new(3, 3),
    };

    fn scored<'a>(pairs: &[(&'a Template, f64)]) -> Vec<TemplateScore<'a>> {
        pairs
            .iter()
            .map(|&(template, score)| TemplateScore { template, score })
            .collect()
    }

    #[test]
    fn lowest_score_wins() {
        let result = select(scored(&[(&ODD_3ROWS, 0.03), (&EVEN_3ROWS, 0.2), (&ODD_2ROWS, 0.04)]));
        assert_eq!(result.template.map(|t| t.code), Some("ODD_3ROWS"));
        assert_eq!(result.score, Some(0.03));
    }

    #[test]
    fn all_above_threshold_is_no_match() {
        let result = select(scored(&[(&ODD_3ROWS, 0.3), (&EVEN_3ROWS, 0.06), (&ODD_2ROWS, 0.5)]));
        assert!(!result.is_match());
        assert_eq!(result.score, Some(0.06));
    }

    #[test]
    fn threshold_boundary() {
        let at = select(scored(&[(&A, ACCEPTANCE_THRESHOLD)]));
        assert_eq!(at.template.map(|t| t.code), Some("A"));

        let above = select(scored(&[(&A, f64::from_bits(ACCEPTANCE_THRESHOLD.to_bits() + 1))]));
        assert!(!above.is_match());
    }

    #[test]
    fn ties_keep_catalog_order() {
        let result = select(scored(&[(&A, 0.01), (&B, 0.01)]));
        assert_eq!(result.template.map(|t| t.code), Some("A"));

        let result = select(scored(&[(&B, 0.01), (&A, 0.01)]));
        assert_eq!(result.template.map(|t| t.code), Some("B"));
    }

    #[test]
    fn empty_catalog_is_no_match() {
        let edges = EdgeMap::from_raw(4, 4, vec![0; 16]).unwrap();
        let result = match_template(&edges, &[]);
        assert!(!result.is_match());
        assert_eq!(result.score, None);
    }

    #[test]
    fn blank_page_ties_resolve_to_first_template() {
        let edges = EdgeMap::from_raw(1600, 2000, vec![0; 1600 * 2000]).unwrap();
        let ranked = rank(&edges, CATALOG);
        assert!(ranked.iter().all(|s| s.score == 0.0));
        assert_eq!(ranked[0].template.code, "ODD_3ROWS");
        assert_eq!(match_template(&edges, CATALOG).template.map(|t| t.code), Some("ODD_3ROWS"));
    }

    #[test]
    fn dark_page_matches_nothing() {
        let edges = EdgeMap::from_raw(1600, 2000, vec![255; 1600 * 2000]).unwrap();
        let result = match_template(&edges, CATALOG);
        assert!(!result.is_match());
        assert_eq!(result.score, Some(1.0));
    }

    #[tokio::test]
    async fn undecodable_file_is_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let result = match_page(&path, CATALOG).await;
        assert!(!result.is_match());
        assert_eq!(result.score, None);
    }
}

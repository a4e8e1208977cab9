//! Point-based mask selection

use thiserror::Error;
use tracing::debug;

use super::codec::{MASK_THRESHOLD, decode_fitted};
use super::geometry::contains_point;
use super::types::MaskError;

/// Errors that can occur while selecting a mask at a point
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("No mask found at point ({x}, {y})")]
    NoMaskAtPoint { x: i64, y: i64 },

    #[error("Candidate mask {index} could not be decoded: {source}")]
    Decode {
        index: usize,
        #[source]
        source: MaskError,
    },
}

/// A transport-encoded mask with an optional quality score
pub trait ScoredMask {
    fn encoded_mask(&self) -> &str;
    fn score(&self) -> Option<f32>;
}

/// Pick the highest-scoring candidate containing `(x, y)`
///
/// Candidates are decoded and fitted to `width`x`height` before the
/// containment test. A missing score counts as 0; ties keep the earliest
/// candidate.
pub fn best_mask_at<'a, M: ScoredMask>(
    x: i64,
    y: i64,
    candidates: &'a [M],
    width: u32,
    height: u32,
) -> Result<&'a M, SelectionError> {
    let mut best: Option<(&'a M, f32)> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        let mask = decode_fitted(candidate.encoded_mask(), width, height, MASK_THRESHOLD)
            .map_err(|source| SelectionError::Decode { index, source })?;

        if !contains_point(&mask, x, y) {
            continue;
        }

        let score = candidate.score().unwrap_or(0.0);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((candidate, score)),
        }
    }

    let (selected, score) = best.ok_or(SelectionError::NoMaskAtPoint { x, y })?;
    debug!(
        "Selected mask at ({}, {}) with score {} out of {} candidates",
        x,
        y,
        score,
        candidates.len()
    );
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::codec::encode;
    use crate::mask::types::BinaryMask;

    struct Candidate {
        name: &'static str,
        mask: String,
        score: Option<f32>,
    }

    impl ScoredMask for Candidate {
        fn encoded_mask(&self) -> &str {
            &self.mask
        }

        fn score(&self) -> Option<f32> {
            self.score
        }
    }

    fn square(name: &'static str, x0: u32, x1: u32, score: Option<f32>) -> Candidate {
        let mask = BinaryMask::from_fn(32, 32, |x, y| x >= x0 && x <= x1 && y >= x0 && y <= x1);
        Candidate {
            name,
            mask: encode(&mask).unwrap(),
            score,
        }
    }

    #[test]
    fn test_highest_score_wins() {
        let candidates = vec![
            square("low", 5, 15, Some(0.3)),
            square("high", 8, 12, Some(0.9)),
            square("mid", 0, 20, Some(0.5)),
        ];

        let best = best_mask_at(10, 10, &candidates, 32, 32).unwrap();
        assert_eq!(best.name, "high");
    }

    #[test]
    fn test_ignores_masks_not_containing_point() {
        let candidates = vec![
            square("far", 25, 30, Some(0.99)),
            square("near", 5, 15, Some(0.2)),
        ];

        let best = best_mask_at(10, 10, &candidates, 32, 32).unwrap();
        assert_eq!(best.name, "near");
    }

    #[test]
    fn test_ties_keep_first_and_missing_score_is_zero() {
        let candidates = vec![
            square("unscored", 5, 15, None),
            square("first", 5, 15, Some(0.5)),
            square("second", 5, 15, Some(0.5)),
        ];

        let best = best_mask_at(10, 10, &candidates, 32, 32).unwrap();
        assert_eq!(best.name, "first");

        let only_unscored = vec![square("unscored", 5, 15, None)];
        let best = best_mask_at(10, 10, &only_unscored, 32, 32).unwrap();
        assert_eq!(best.name, "unscored");
    }

    #[test]
    fn test_no_containing_mask_is_not_found() {
        let candidates = vec![square("a", 5, 15, Some(0.3)), square("b", 8, 12, Some(0.9))];
        let result = best_mask_at(0, 0, &candidates, 32, 32);
        assert!(matches!(
            result,
            Err(SelectionError::NoMaskAtPoint { x: 0, y: 0 })
        ));
    }

    #[test]
    fn test_undecodable_candidate_aborts() {
        let candidates = vec![
            square("ok", 5, 15, Some(0.3)),
            Candidate {
                name: "broken",
                mask: "%%%".to_string(),
                score: Some(1.0),
            },
        ];

        let result = best_mask_at(10, 10, &candidates, 32, 32);
        assert!(matches!(result, Err(SelectionError::Decode { index: 1, .. })));
    }
}

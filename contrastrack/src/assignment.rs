//! Strict and loose positive assignment for one batch item

use crate::config::MatcherConfig;
use crate::cost::compute_cost;
use crate::dynamic_k::dynamic_k_matching;
use crate::error::{MatchError, Result};
use ndarray::prelude::*;

/// Assignment of one ground-truth slot
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// Mask over the predictions selected for this ground truth
    Valid(Array1<bool>),
    /// Padding or invalid ground truth, never matched
    Invalid,
}

impl Assignment {
    pub fn mask(&self) -> Option<&Array1<bool>> {
        match self {
            Assignment::Valid(mask) => Some(mask),
            Assignment::Invalid => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Assignment::Valid(_))
    }

    /// Indices of the selected predictions (empty when invalid)
    pub fn indices(&self) -> Vec<usize> {
        self.mask()
            .map(|mask| {
                mask.iter()
                    .enumerate()
                    .filter(|(_, &b)| b)
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Strict (small candidate pool) and loose (large candidate pool) assignments,
/// both indexed like the unfiltered ground-truth list
#[derive(Debug, Clone, PartialEq)]
pub struct PosNegAssignment {
    pub strict: Vec<Assignment>,
    pub loose: Vec<Assignment>,
}

/// Assign predictions of one batch item to its valid ground truths
///
/// # Arguments
/// * `boxes` - (num_predictions, 4) predicted boxes, [cx, cy, w, h]
/// * `probs` - (num_predictions, num_classes) class probabilities
/// * `gt_boxes` - (num_gt, 4) ground-truth boxes, [cx, cy, w, h]
/// * `gt_labels` - class index per ground truth
/// * `valid` - validity flag per ground truth
///
/// # Returns
/// With no ground truth at all, a single `Invalid` marker in both lists.
/// Otherwise one entry per ground truth, `Invalid` where `valid` is false.
pub fn get_pos_idx(
    boxes: ArrayView2<f32>,
    probs: ArrayView2<f32>,
    gt_boxes: ArrayView2<f32>,
    gt_labels: &[usize],
    valid: &[bool],
    config: &MatcherConfig,
) -> Result<PosNegAssignment> {
    let num_gt = gt_boxes.nrows();

    if valid.len() != num_gt {
        return Err(MatchError::shape("validity mask", vec![num_gt], vec![valid.len()]));
    }
    if gt_labels.len() != num_gt {
        return Err(MatchError::shape("ground-truth labels", vec![num_gt], vec![gt_labels.len()]));
    }
    if num_gt == 0 {
        return Ok(PosNegAssignment {
            strict: vec![Assignment::Invalid],
            loose: vec![Assignment::Invalid],
        });
    }

    let valid_idx: Vec<usize> = (0..num_gt).filter(|&i| valid[i]).collect();
    if valid_idx.is_empty() {
        return Ok(PosNegAssignment {
            strict: vec![Assignment::Invalid; num_gt],
            loose: vec![Assignment::Invalid; num_gt],
        });
    }

    let valid_boxes = gt_boxes.select(Axis(0), &valid_idx);
    let valid_labels: Vec<usize> = valid_idx.iter().map(|&i| gt_labels[i]).collect();

    let matrices = compute_cost(boxes, probs, valid_boxes.view(), &valid_labels, config)?;
    let num_valid = valid_idx.len();

    let strict = dynamic_k_matching(
        matrices.cost.view(),
        matrices.ious.view(),
        num_valid,
        config.strict_pool_size,
        config,
    )?;
    let loose = dynamic_k_matching(
        matrices.cost.view(),
        matrices.ious.view(),
        num_valid,
        config.loose_pool_size,
        config,
    )?;

    Ok(PosNegAssignment {
        strict: expand(strict, valid),
        loose: expand(loose, valid),
    })
}

/// Place per-valid-GT masks back at their original positions
fn expand(masks: Vec<Array1<bool>>, valid: &[bool]) -> Vec<Assignment> {
    let mut masks = masks.into_iter();
    valid
        .iter()
        .map(|&is_valid| {
            if is_valid {
                masks.next().map(Assignment::Valid).unwrap_or(Assignment::Invalid)
            } else {
                Assignment::Invalid
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Predictions on a 0.1 grid inside the unit square
    fn grid_predictions() -> Array2<f32> {
        let mut rows = Vec::new();
        for y in 0..10 {
            for x in 0..10 {
                rows.extend_from_slice(&[0.05 + 0.1 * x as f32, 0.05 + 0.1 * y as f32, 0.1, 0.1]);
            }
        }
        Array2::from_shape_vec((100, 4), rows).unwrap()
    }

    #[test]
    fn test_single_contained_prediction_is_sole_positive() {
        let config = MatcherConfig::default();
        // Only prediction 1 lies inside the GT box; all share the same class score
        let boxes = array![
            [0.1, 0.1, 0.1, 0.1],
            [0.5, 0.5, 0.1, 0.1],
            [0.9, 0.9, 0.1, 0.1],
            [0.9, 0.1, 0.1, 0.1],
        ];
        let probs = Array2::from_elem((4, 3), 0.3);
        let gt = array![[0.5, 0.5, 0.2, 0.2]];

        let result = get_pos_idx(boxes.view(), probs.view(), gt.view(), &[2], &[true], &config).unwrap();
        assert_eq!(result.strict, vec![Assignment::Valid(array![false, true, false, false])]);
        assert_eq!(result.loose, result.strict);
    }

    #[test]
    fn test_invalid_slots_are_preserved() {
        let config = MatcherConfig::default();
        let boxes = grid_predictions();
        let probs = Array2::from_elem((100, 2), 0.5);
        let gt = array![
            [0.25, 0.25, 0.2, 0.2],
            [0.55, 0.55, 0.3, 0.3],
            [0.75, 0.25, 0.2, 0.2],
        ];

        let result = get_pos_idx(
            boxes.view(),
            probs.view(),
            gt.view(),
            &[0, 1, 0],
            &[true, false, true],
            &config,
        )
        .unwrap();

        assert_eq!(result.strict.len(), 3);
        assert!(result.strict[0].is_valid());
        assert_eq!(result.strict[1], Assignment::Invalid);
        assert!(result.strict[2].is_valid());
        assert_eq!(result.loose[1], Assignment::Invalid);

        // Positives of GT 0 sit in its box, those of GT 2 in its own
        for &q in &result.strict[0].indices() {
            assert!(boxes[[q, 0]] < 0.5 && boxes[[q, 1]] < 0.5);
        }
        for &q in &result.strict[2].indices() {
            assert!(boxes[[q, 0]] > 0.5 && boxes[[q, 1]] < 0.5);
        }
    }

    #[test]
    fn test_empty_ground_truth() {
        let config = MatcherConfig::default();
        let boxes = grid_predictions();
        let probs = Array2::from_elem((100, 2), 0.5);
        let gt = Array2::<f32>::zeros((0, 4));

        let result = get_pos_idx(boxes.view(), probs.view(), gt.view(), &[], &[], &config).unwrap();
        assert_eq!(result.strict, vec![Assignment::Invalid]);
        assert_eq!(result.loose, vec![Assignment::Invalid]);
    }

    #[test]
    fn test_all_invalid() {
        let config = MatcherConfig::default();
        let boxes = grid_predictions();
        let probs = Array2::from_elem((100, 2), 0.5);
        let gt = array![[0.25, 0.25, 0.2, 0.2], [0.75, 0.75, 0.2, 0.2]];

        let result =
            get_pos_idx(boxes.view(), probs.view(), gt.view(), &[0, 1], &[false, false], &config).unwrap();
        assert_eq!(result.strict, vec![Assignment::Invalid, Assignment::Invalid]);
        assert_eq!(result.loose, vec![Assignment::Invalid, Assignment::Invalid]);
    }

    #[test]
    fn test_validity_length_mismatch() {
        let config = MatcherConfig::default();
        let boxes = grid_predictions();
        let probs = Array2::from_elem((100, 2), 0.5);
        let gt = array![[0.25, 0.25, 0.2, 0.2]];

        let err = get_pos_idx(boxes.view(), probs.view(), gt.view(), &[0], &[true, true], &config);
        assert!(matches!(err, Err(MatchError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_loose_covers_at_least_strict_count() {
        let config = MatcherConfig::default();
        let boxes = grid_predictions();
        let probs = Array2::from_elem((100, 2), 0.5);
        let gt = array![[0.5, 0.5, 0.4, 0.4]];

        let result = get_pos_idx(boxes.view(), probs.view(), gt.view(), &[1], &[true], &config).unwrap();
        let strict = result.strict[0].indices();
        let loose = result.loose[0].indices();
        assert!(!strict.is_empty());
        assert!(loose.len() >= strict.len());
        // Same cost ordering: the strict picks are the cheapest loose picks
        assert!(strict.iter().all(|q| loose.contains(q)));
    }
}

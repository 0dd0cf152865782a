//! Candidate-region masks: which predictions fall inside a ground-truth box
//! or inside the fixed square around its center

use crate::bbox::Bbox;
use crate::error::{MatchError, Result};
use ndarray::prelude::*;

/// Region masks over the (num_predictions, num_gt) grid
#[derive(Debug, Clone, PartialEq)]
pub struct InBoxesInfo {
    /// Prediction lies in some GT box or some GT center square, shape (num_predictions,)
    pub is_in_boxes_anchor: Array1<bool>,
    /// Prediction lies in both the box and the center square of GT j, shape (num_predictions, num_gt)
    pub is_in_boxes_and_center: Array2<bool>,
}

/// Compute region masks from prediction centers and ground-truth boxes
///
/// Both inputs are `[cx, cy, w, h]` rows; only the prediction centers are read.
/// The center square of a GT has half side `center_radius / expanded_strides`.
/// All comparisons are strict. Both inputs must have four columns.
pub fn get_in_boxes_info(
    boxes: ArrayView2<f32>,
    target_gts: ArrayView2<f32>,
    center_radius: f32,
    expanded_strides: f32,
) -> Result<InBoxesInfo> {
    let num_preds = boxes.nrows();
    let num_gt = target_gts.nrows();
    if boxes.ncols() != 4 {
        return Err(MatchError::shape("predicted boxes", vec![num_preds, 4], boxes.shape().to_vec()));
    }
    if target_gts.ncols() != 4 {
        return Err(MatchError::shape("ground-truth boxes", vec![num_gt, 4], target_gts.shape().to_vec()));
    }
    let half_side = center_radius / expanded_strides;

    let gt_boxes: Vec<Bbox<f32>> = target_gts
        .outer_iter()
        .map(|g| Bbox::from_cxcywh(g[0], g[1], g[2], g[3]))
        .collect();
    let gt_centers: Vec<Bbox<f32>> = target_gts
        .outer_iter()
        .map(|g| Bbox::new(g[0] - half_side, g[1] - half_side, g[0] + half_side, g[1] + half_side))
        .collect();

    let mut is_in_boxes_anchor = Array1::from_elem(num_preds, false);
    let mut is_in_boxes_and_center = Array2::from_elem((num_preds, num_gt), false);

    for (i, pred) in boxes.outer_iter().enumerate() {
        let (x, y) = (pred[0], pred[1]);
        let mut in_any = false;
        for j in 0..num_gt {
            let in_box = gt_boxes[j].contains_strict(x, y);
            let in_center = gt_centers[j].contains_strict(x, y);
            in_any |= in_box || in_center;
            is_in_boxes_and_center[[i, j]] = in_box && in_center;
        }
        is_in_boxes_anchor[i] = in_any;
    }

    Ok(InBoxesInfo {
        is_in_boxes_anchor,
        is_in_boxes_and_center,
    })
}

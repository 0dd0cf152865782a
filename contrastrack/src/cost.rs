//! Matching cost between predictions and ground-truth instances

use crate::bbox::{box_cxcywh_to_xyxy, box_iou, generalized_box_iou};
use crate::config::MatcherConfig;
use crate::error::{MatchError, Result};
use crate::geometry::get_in_boxes_info;
use ndarray::prelude::*;

/// Cost and IoU matrices for one batch item, both (num_predictions, num_gt)
#[derive(Debug, Clone)]
pub struct CostMatrices {
    pub cost: Array2<f32>,
    pub ious: Array2<f32>,
}

/// Focal classification cost of predicting probability `p` for the target class
///
/// `alpha*(1-p)^gamma*(-ln(p+eps)) - (1-alpha)*p^gamma*(-ln(1-p+eps))`
pub fn focal_class_cost(p: f32, config: &MatcherConfig) -> f32 {
    let alpha = config.focal_alpha;
    let gamma = config.focal_gamma;
    let pos = alpha * (1.0 - p).powf(gamma) * -(p + config.eps).ln();
    let neg = (1.0 - alpha) * p.powf(gamma) * -(1.0 - p + config.eps).ln();
    pos - neg
}

/// Build the total matching cost and the IoU matrix
///
/// * `boxes` - (num_predictions, 4) predicted boxes, [cx, cy, w, h]
/// * `probs` - (num_predictions, num_classes) class probabilities
/// * `gt_boxes` - (num_gt, 4) ground-truth boxes, [cx, cy, w, h]
/// * `gt_labels` - class index of each ground truth
pub fn compute_cost(
    boxes: ArrayView2<f32>,
    probs: ArrayView2<f32>,
    gt_boxes: ArrayView2<f32>,
    gt_labels: &[usize],
    config: &MatcherConfig,
) -> Result<CostMatrices> {
    let num_preds = boxes.nrows();
    let num_gt = gt_boxes.nrows();

    if boxes.ncols() != 4 {
        return Err(MatchError::shape("predicted boxes", vec![num_preds, 4], boxes.shape().to_vec()));
    }
    if gt_boxes.ncols() != 4 {
        return Err(MatchError::shape("ground-truth boxes", vec![num_gt, 4], gt_boxes.shape().to_vec()));
    }
    if probs.nrows() != num_preds {
        return Err(MatchError::shape(
            "class probabilities",
            vec![num_preds, probs.ncols()],
            probs.shape().to_vec(),
        ));
    }
    if gt_labels.len() != num_gt {
        return Err(MatchError::shape("ground-truth labels", vec![num_gt], vec![gt_labels.len()]));
    }
    if let Some(&label) = gt_labels.iter().find(|&&l| l >= probs.ncols()) {
        return Err(MatchError::shape("class index", vec![probs.ncols()], vec![label]));
    }

    let info = get_in_boxes_info(boxes, gt_boxes, config.center_radius, config.expanded_strides)?;

    let pred_xyxy = box_cxcywh_to_xyxy(boxes);
    let gt_xyxy = box_cxcywh_to_xyxy(gt_boxes);
    let ious = box_iou(pred_xyxy.view(), gt_xyxy.view());
    let giou = generalized_box_iou(pred_xyxy.view(), gt_xyxy.view());

    let mut cost = Array2::zeros((num_preds, num_gt));
    for ((i, j), c) in cost.indexed_iter_mut() {
        let class_cost = focal_class_cost(probs[[i, gt_labels[j]]], config);
        let region_penalty = if info.is_in_boxes_and_center[[i, j]] {
            0.0
        } else {
            config.center_penalty
        };
        *c = class_cost - config.giou_weight * giou[[i, j]] + region_penalty;
    }

    for (mut row, &in_region) in cost.outer_iter_mut().zip(info.is_in_boxes_anchor.iter()) {
        if !in_region {
            row += config.out_of_region_penalty;
        }
    }

    Ok(CostMatrices { cost, ious })
}

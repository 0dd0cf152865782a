//! Dynamic-k assignment of predictions to ground-truth instances
//!
//! Unlike one-to-one Hungarian matching, every ground truth receives a variable
//! number of positives derived from how well the predictions around it overlap
//! it. A prediction claimed by several ground truths is kept by the cheapest
//! one, and ground truths left without positives are refilled until none is
//! empty.

use crate::config::MatcherConfig;
use crate::error::{MatchError, Result};
use ndarray::prelude::*;

/// Number of positives per ground truth: `max(1, floor(sum of the top-pool IoUs))`
///
/// The pool is capped at the number of predictions.
pub fn dynamic_ks(ious: ArrayView2<f32>, candidate_pool: usize) -> Vec<usize> {
    let num_preds = ious.nrows();
    let pool = candidate_pool.min(num_preds);

    ious.columns()
        .into_iter()
        .map(|column| {
            let mut values = column.to_vec();
            values.sort_by(|a, b| b.total_cmp(a));
            let top_sum: f32 = values.iter().take(pool).sum();
            let k = (top_sum as i64).max(1) as usize;
            k.min(num_preds.max(1))
        })
        .collect()
}

/// Indices of the `k` smallest values, ties broken by lower index
fn lowest_k(values: ArrayView1<f32>, k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]).then(a.cmp(&b)));
    order.truncate(k);
    order
}

/// Index of the first minimum
fn argmin(values: ArrayView1<f32>) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b <= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

fn row_sums(matching: &Array2<u8>) -> Vec<usize> {
    matching
        .rows()
        .into_iter()
        .map(|row| row.iter().map(|&v| v as usize).sum())
        .collect()
}

fn empty_columns(matching: &Array2<u8>) -> Vec<usize> {
    matching
        .columns()
        .into_iter()
        .enumerate()
        .filter(|(_, col)| col.iter().all(|&v| v == 0))
        .map(|(j, _)| j)
        .collect()
}

/// Keep only the cheapest column on each of `rows`
fn resolve_conflicts(matching: &mut Array2<u8>, cost: ArrayView2<f32>, rows: &[usize]) {
    for &row in rows {
        if let Some(best) = argmin(cost.row(row)) {
            let mut assigned = matching.row_mut(row);
            assigned.fill(0);
            assigned[best] = 1;
        }
    }
}

fn shared_rows(matching: &Array2<u8>) -> Vec<usize> {
    row_sums(matching)
        .iter()
        .enumerate()
        .filter(|(_, &n)| n > 1)
        .map(|(i, _)| i)
        .collect()
}

/// Give every empty column one prediction without sharing
///
/// A column takes its cheapest row among the unmatched rows and the rows of
/// columns holding more than one prediction. Rows in `protected` are only
/// taken when nothing else is available. `matching` must be exclusive.
fn fill_starved(matching: &mut Array2<u8>, cost: ArrayView2<f32>, protected: &[usize]) {
    for gt_idx in empty_columns(matching) {
        let col_sizes: Vec<usize> = matching
            .columns()
            .into_iter()
            .map(|col| col.iter().map(|&v| v as usize).sum())
            .collect();
        let movable: Vec<usize> = matching
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(_, row)| match row.iter().position(|&v| v > 0) {
                Some(owner) => col_sizes[owner] > 1,
                None => true,
            })
            .map(|(i, _)| i)
            .collect();

        let unprotected: Vec<usize> = movable
            .iter()
            .copied()
            .filter(|r| !protected.contains(r))
            .collect();
        let candidates = if unprotected.is_empty() { movable } else { unprotected };

        let cheapest = candidates
            .iter()
            .copied()
            .fold(None, |best: Option<usize>, r| match best {
                Some(b) if cost[[b, gt_idx]] <= cost[[r, gt_idx]] => best,
                _ => Some(r),
            });
        if let Some(row) = cheapest {
            let mut assigned = matching.row_mut(row);
            assigned.fill(0);
            assigned[gt_idx] = 1;
        }
    }
}

/// Assign a dynamic number of positive predictions to each ground truth
///
/// # Arguments
/// * `cost` - (num_predictions, num_gt) matching cost; left untouched
/// * `ious` - (num_predictions, num_gt) IoU between predictions and ground truths
/// * `num_gt` - number of ground truths, must equal the column count
/// * `candidate_pool` - number of top IoUs summed to size each ground truth's k
///
/// Requires at least as many predictions as ground truths and finite inputs.
///
/// # Returns
/// One mask over the predictions per ground truth. Every mask has at least one
/// `true` entry and no prediction is `true` in two masks.
pub fn dynamic_k_matching(
    cost: ArrayView2<f32>,
    ious: ArrayView2<f32>,
    num_gt: usize,
    candidate_pool: usize,
    config: &MatcherConfig,
) -> Result<Vec<Array1<bool>>> {
    let (num_preds, num_cols) = cost.dim();

    if ious.dim() != cost.dim() {
        return Err(MatchError::shape(
            "IoU matrix",
            vec![num_preds, num_cols],
            ious.shape().to_vec(),
        ));
    }
    if num_gt != num_cols {
        return Err(MatchError::shape("ground-truth count", vec![num_cols], vec![num_gt]));
    }
    if num_gt == 0 {
        return Ok(Vec::new());
    }
    if num_preds < num_gt {
        return Err(MatchError::shape(
            "predictions per ground truth",
            vec![num_gt],
            vec![num_preds],
        ));
    }
    if !cost.iter().all(|v| v.is_finite()) {
        return Err(MatchError::NonFinite("matching cost".into()));
    }
    if !ious.iter().all(|v| v.is_finite()) {
        return Err(MatchError::NonFinite("IoU matrix".into()));
    }

    // Scratch copy: the starvation loop raises costs of matched predictions.
    let mut penalized = cost.to_owned();
    let mut matching = Array2::<u8>::zeros((num_preds, num_gt));

    for (gt_idx, &k) in dynamic_ks(ious, candidate_pool).iter().enumerate() {
        for pred_idx in lowest_k(penalized.column(gt_idx), k) {
            matching[[pred_idx, gt_idx]] = 1;
        }
    }

    // Rows claimed by several ground truths before any refill. They stay with
    // their cheapest column unless no other row can fill a starved one.
    let conflicted = shared_rows(&matching);
    resolve_conflicts(&mut matching, penalized.view(), &conflicted);

    let mut passes = 0usize;
    loop {
        let unmatched = empty_columns(&matching);
        if unmatched.is_empty() {
            break;
        }
        if passes >= num_preds {
            log::debug!(
                "dynamic-k refill gave up after {} passes with {} empty ground truths",
                passes,
                unmatched.len()
            );
            fill_starved(&mut matching, cost, &conflicted);
            break;
        }
        passes += 1;

        let before = matching.clone();
        let sums = row_sums(&matching);
        for (mut row, &n) in penalized.outer_iter_mut().zip(sums.iter()) {
            if n > 0 {
                row += config.starvation_penalty;
            }
        }

        for &gt_idx in &unmatched {
            if let Some(pred_idx) = argmin(penalized.column(gt_idx)) {
                matching[[pred_idx, gt_idx]] = 1;
            }
        }
        let shared = shared_rows(&matching);
        resolve_conflicts(&mut matching, penalized.view(), &shared);

        // The refill bounced back onto rows that keep their column
        if matching == before {
            log::debug!(
                "dynamic-k refill stalled after {} passes with {} empty ground truths",
                passes,
                unmatched.len()
            );
            fill_starved(&mut matching, cost, &conflicted);
            break;
        }
    }

    log::trace!(
        "dynamic-k matching: {} predictions, {} ground truths, pool {}, {} refill passes",
        num_preds,
        num_gt,
        candidate_pool,
        passes
    );

    Ok(matching
        .columns()
        .into_iter()
        .map(|col| col.mapv(|v| v > 0))
        .collect())
}

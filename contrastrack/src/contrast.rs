//! Queue-prototype (sword) contrast and vector helpers

use crate::diagnostics::DiagnosticSink;
use crate::error::{MatchError, Result};
use crate::object_queue::ObjectQueue;
use ndarray::prelude::*;

/// Numerically stable `ln(sum(exp(x)))`; `-inf` for an empty input
pub fn logsumexp(values: &[f32]) -> f32 {
    let max = values.iter().fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    if max.is_infinite() {
        return max;
    }
    let sum: f32 = values.iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Scale each row to unit L2 norm, with the norm floored at `eps`
pub fn l2_normalize_rows(embeds: ArrayView2<f32>, eps: f32) -> Array2<f32> {
    let mut out = embeds.to_owned();
    for mut row in out.outer_iter_mut() {
        let norm = row.dot(&row).sqrt().max(eps);
        row /= norm;
    }
    out
}

/// Sword contrast of positive and negative embeddings against the queue center
///
/// * `pos` - (num_pos, dim) positive embeddings
/// * `neg` - (num_neg, dim) negative embeddings
///
/// Returns `logsumexp(center·pos ++ center·neg) - logsumexp(center·pos)`.
pub fn get_sword_contrast(
    object_queue: &ObjectQueue,
    pos: ArrayView2<f32>,
    neg: ArrayView2<f32>,
    sink: &dyn DiagnosticSink,
) -> Result<f32> {
    let center = object_queue.center()?;
    let dim = center.len();

    if pos.ncols() != dim {
        return Err(MatchError::shape("sword positives", vec![pos.nrows(), dim], pos.shape().to_vec()));
    }
    if neg.ncols() != dim {
        return Err(MatchError::shape("sword negatives", vec![neg.nrows(), dim], neg.shape().to_vec()));
    }

    sink.log_id(
        99,
        format_args!(
            "center shape: {:?}, pos & neg shape: {:?}, {:?}",
            center.shape(),
            pos.shape(),
            neg.shape()
        ),
    );

    let pos_product = pos.dot(&center);
    let neg_product = neg.dot(&center);

    let pos_scores = pos_product.to_vec();
    let all_scores: Vec<f32> = pos_product.iter().chain(neg_product.iter()).copied().collect();

    let all_sum = logsumexp(&all_scores);
    let pos_sum = logsumexp(&pos_scores);

    sink.log_id(100, format_args!("all_sum = {}, pos_sum = {}", all_sum, pos_sum));

    Ok(all_sum - pos_sum)
}

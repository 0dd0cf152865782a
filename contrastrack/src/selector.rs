//! Positive/negative selection and contrast batch assembly
//!
//! For each valid ground truth of each batch item, the strict assignment gives
//! the positive reference queries and the complement of the loose assignment
//! gives the negatives. Queries in the loose but not the strict assignment are
//! ambiguous: they are left out of the primary contrast and only serve as
//! negatives of the sword contrast.

use crate::assignment::{get_pos_idx, PosNegAssignment};
use crate::config::SelectorConfig;
use crate::contrast::{get_sword_contrast, l2_normalize_rows};
use crate::diagnostics::{DiagnosticSink, NoopSink};
use crate::error::{MatchError, Result};
use crate::object_queue::ObjectQueue;
use ndarray::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use std::sync::Arc;

/// Projection of decoder hidden states (batch, queries, hidden) to embeddings (batch, queries, dim)
pub trait EmbeddingHead: Sync {
    fn embed(&self, hidden: ArrayView3<f32>) -> Array3<f32>;
}

impl<F> EmbeddingHead for F
where
    F: Fn(ArrayView3<f32>) -> Array3<f32> + Sync,
{
    fn embed(&self, hidden: ArrayView3<f32>) -> Array3<f32> {
        self(hidden)
    }
}

/// Affine embedding head: `hidden · weight + bias`
#[derive(Debug, Clone)]
pub struct LinearEmbeddingHead {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl LinearEmbeddingHead {
    /// `weight` is (hidden, dim), `bias` is (dim,)
    pub fn new(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self> {
        if weight.ncols() != bias.len() {
            return Err(MatchError::shape(
                "embedding bias",
                vec![weight.ncols()],
                vec![bias.len()],
            ));
        }
        Ok(Self { weight, bias })
    }

    pub fn hidden_dim(&self) -> usize {
        self.weight.nrows()
    }

    pub fn embed_dim(&self) -> usize {
        self.weight.ncols()
    }
}

impl EmbeddingHead for LinearEmbeddingHead {
    fn embed(&self, hidden: ArrayView3<f32>) -> Array3<f32> {
        let (batch, queries, _) = hidden.dim();
        let mut out = Array3::zeros((batch, queries, self.embed_dim()));
        for (item, mut dst) in hidden.outer_iter().zip(out.outer_iter_mut()) {
            dst.assign(&(item.dot(&self.weight) + &self.bias));
        }
        out
    }
}

/// Annotations of one frame of one batch item
#[derive(Debug, Clone)]
pub struct FrameTargets {
    /// (num_instances, 4) boxes, [cx, cy, w, h]
    pub boxes: Array2<f32>,
    pub labels: Vec<usize>,
    pub valid: Vec<bool>,
}

impl FrameTargets {
    pub fn new(boxes: Array2<f32>, labels: Vec<usize>, valid: Vec<bool>) -> Result<Self> {
        let targets = Self {
            boxes,
            labels,
            valid,
        };
        targets.check()?;
        Ok(targets)
    }

    pub fn num_instances(&self) -> usize {
        self.labels.len()
    }

    fn check(&self) -> Result<()> {
        let n = self.labels.len();
        if self.boxes.dim() != (n, 4) {
            return Err(MatchError::shape("target boxes", vec![n, 4], self.boxes.shape().to_vec()));
        }
        if self.valid.len() != n {
            return Err(MatchError::shape("target validity", vec![n], vec![self.valid.len()]));
        }
        Ok(())
    }
}

/// Contrast batch of one ground-truth instance
#[derive(Debug, Clone)]
pub struct ContrastItem {
    /// (num_pos + num_neg, 1) dot products with the key embedding
    pub contrast: Array2<f32>,
    /// 1 for positives, 0 for negatives
    pub label: Array1<f32>,
    /// (num_pos + num_sampled_neg, 1) cosine similarities with the key embedding
    pub aux_cosine: Array2<f32>,
    pub aux_label: Array1<f32>,
    pub sword_contrast: f32,
}

/// Per-step model outputs and annotations
#[derive(Debug, Clone, Copy)]
pub struct SelectionInputs<'a> {
    /// (batch, queries, 4) reference-frame boxes, [cx, cy, w, h]
    pub ref_boxes: ArrayView3<'a, f32>,
    /// (batch, queries, classes) reference-frame class probabilities
    pub ref_probs: ArrayView3<'a, f32>,
    /// Key-frame query matched to each instance, per batch item
    pub all_indices: &'a [Vec<usize>],
    /// Reference-frame annotations
    pub targets: &'a [FrameTargets],
    /// Key-frame annotations
    pub key_targets: &'a [FrameTargets],
    /// (batch, key_queries, hidden) key-frame hidden states
    pub hs_key: ArrayView3<'a, f32>,
    /// (batch, queries, hidden) reference-frame hidden states
    pub hs_ref: ArrayView3<'a, f32>,
}

impl SelectionInputs<'_> {
    /// Check batch and per-instance shapes before any work is done
    fn check(&self) -> Result<()> {
        let batch = self.targets.len();
        if self.all_indices.len() != batch {
            return Err(MatchError::shape("batch size", vec![batch], vec![self.all_indices.len()]));
        }
        if self.key_targets.len() != batch {
            return Err(MatchError::shape("key-frame batch size", vec![batch], vec![self.key_targets.len()]));
        }

        let (_, queries, box_cols) = self.ref_boxes.dim();
        for (name, shape) in [
            ("reference boxes", self.ref_boxes.shape()),
            ("reference class probabilities", self.ref_probs.shape()),
            ("key hidden states", self.hs_key.shape()),
            ("reference hidden states", self.hs_ref.shape()),
        ] {
            if shape[0] != batch {
                return Err(MatchError::shape(name, vec![batch], vec![shape[0]]));
            }
        }
        if box_cols != 4 {
            return Err(MatchError::shape("reference boxes", vec![batch, queries, 4], self.ref_boxes.shape().to_vec()));
        }
        if self.ref_probs.dim().1 != queries {
            return Err(MatchError::shape("reference class probabilities", vec![queries], vec![self.ref_probs.dim().1]));
        }
        if self.hs_ref.dim().1 != queries {
            return Err(MatchError::shape("reference hidden states", vec![queries], vec![self.hs_ref.dim().1]));
        }

        for key_targets in self.key_targets {
            key_targets.check()?;
        }

        let key_queries = self.hs_key.dim().1;
        for (targets, indices) in self.targets.iter().zip(self.all_indices) {
            targets.check()?;
            if indices.len() != targets.num_instances() {
                return Err(MatchError::shape(
                    "matched key queries",
                    vec![targets.num_instances()],
                    vec![indices.len()],
                ));
            }
            if let Some(&query) = indices.iter().find(|&&q| q >= key_queries) {
                return Err(MatchError::shape("key query index", vec![key_queries], vec![query]));
            }
        }
        Ok(())
    }
}

/// Builds contrast batches from dynamic-k assignments
pub struct PosNegSelector {
    config: SelectorConfig,
    sink: Arc<dyn DiagnosticSink>,
}

impl PosNegSelector {
    pub fn new(config: SelectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sink: Arc::new(NoopSink),
        })
    }

    /// Report intermediate shapes and values to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Strict and loose assignments of every batch item, in batch order
    pub fn assign(&self, inputs: &SelectionInputs) -> Result<Vec<PosNegAssignment>> {
        inputs.check()?;
        let matcher = &self.config.matcher;

        if let Some(targets) = inputs.targets.first() {
            let sink = self.sink.as_ref();
            sink.log_id(1, format_args!("ref_box_bz shape={:?}", &inputs.ref_boxes.shape()[1..]));
            sink.log_id(2, format_args!("ref_cls_bz shape={:?}", &inputs.ref_probs.shape()[1..]));
            sink.log_id(3, format_args!("tgt_bbox shape={:?}", targets.boxes.shape()));
            sink.log_id(4, format_args!("tgt_labels shape=[{}]", targets.labels.len()));
        }

        (0..inputs.targets.len())
            .into_par_iter()
            .map(|b| {
                let targets = &inputs.targets[b];
                get_pos_idx(
                    inputs.ref_boxes.index_axis(Axis(0), b),
                    inputs.ref_probs.index_axis(Axis(0), b),
                    targets.boxes.view(),
                    &targets.labels,
                    &targets.valid,
                    matcher,
                )
            })
            .collect()
    }

    /// Select positives and negatives for every valid instance and build its contrast item
    ///
    /// Items are ordered by batch item, then by instance.
    pub fn select_pos_neg<E, R>(
        &self,
        inputs: &SelectionInputs,
        embed_head: &E,
        object_queue: &ObjectQueue,
        rng: &mut R,
    ) -> Result<Vec<ContrastItem>>
    where
        E: EmbeddingHead + ?Sized,
        R: Rng + ?Sized,
    {
        inputs.check()?;

        let ref_embeds = embed_head.embed(inputs.hs_ref);
        let key_embeds = embed_head.embed(inputs.hs_key);
        let embed_dim = ref_embeds.dim().2;
        let (batch, queries, _) = inputs.hs_ref.dim();
        if ref_embeds.dim() != (batch, queries, embed_dim) {
            return Err(MatchError::shape(
                "reference embeddings",
                vec![batch, queries, embed_dim],
                ref_embeds.shape().to_vec(),
            ));
        }
        let (_, key_queries, _) = inputs.hs_key.dim();
        if key_embeds.dim() != (batch, key_queries, embed_dim) {
            return Err(MatchError::shape(
                "key embeddings",
                vec![batch, key_queries, embed_dim],
                key_embeds.shape().to_vec(),
            ));
        }

        let assignments = self.assign(inputs)?;

        let mut contrast_items = Vec::new();
        for (b, (assignment, (targets, indices))) in assignments
            .iter()
            .zip(inputs.targets.iter().zip(inputs.all_indices))
            .enumerate()
        {
            let ref_b = ref_embeds.index_axis(Axis(0), b);

            for (inst, (&valid, &query)) in targets.valid.iter().zip(indices).enumerate() {
                if !valid {
                    continue;
                }
                let (Some(strict), Some(loose)) =
                    (assignment.strict[inst].mask(), assignment.loose[inst].mask())
                else {
                    continue;
                };

                let key = key_embeds.slice(s![b, query, ..]);
                let item = self.build_item(ref_b, key, strict, loose, object_queue, rng)?;
                contrast_items.push(item);
            }
        }

        log::debug!(
            "Selected contrast items for {} instances over {} batch items",
            contrast_items.len(),
            assignments.len()
        );

        Ok(contrast_items)
    }

    fn build_item<R: Rng + ?Sized>(
        &self,
        ref_embeds: ArrayView2<f32>,
        key: ArrayView1<f32>,
        strict: &Array1<bool>,
        loose: &Array1<bool>,
        object_queue: &ObjectQueue,
        rng: &mut R,
    ) -> Result<ContrastItem> {
        let queries = 0..strict.len();
        let pos_idx: Vec<usize> = queries.clone().filter(|&q| strict[q]).collect();
        let neg_idx: Vec<usize> = queries.clone().filter(|&q| !loose[q]).collect();
        let sword_neg_idx: Vec<usize> = queries.filter(|&q| loose[q] && !strict[q]).collect();

        let pos_embed = ref_embeds.select(Axis(0), &pos_idx);
        let neg_embed = ref_embeds.select(Axis(0), &neg_idx);
        let sword_neg = ref_embeds.select(Axis(0), &sword_neg_idx);

        let sword_contrast =
            get_sword_contrast(object_queue, pos_embed.view(), sword_neg.view(), self.sink.as_ref())?;

        let scores: Vec<f32> = pos_embed
            .dot(&key)
            .iter()
            .chain(neg_embed.dot(&key).iter())
            .copied()
            .collect();
        let contrast = Array1::from(scores).insert_axis(Axis(1));
        let label = binary_labels(pos_idx.len(), neg_idx.len());

        let num_sample_neg = neg_idx
            .len()
            .min(self.config.aux_min_negatives.max(self.config.aux_neg_ratio * pos_idx.len()));
        let aux_idx: Vec<usize> = pos_idx
            .iter()
            .chain(neg_idx.choose_multiple(rng, num_sample_neg))
            .copied()
            .collect();
        let aux_embed = l2_normalize_rows(ref_embeds.select(Axis(0), &aux_idx).view(), self.config.normalize_eps);
        let key_norm = l2_normalize_rows(key.insert_axis(Axis(0)), self.config.normalize_eps);
        let aux_cosine = aux_embed.dot(&key_norm.t());
        let aux_label = binary_labels(pos_idx.len(), num_sample_neg);

        self.sink
            .log_id(66, format_args!("original contrast: {}", contrast));

        Ok(ContrastItem {
            contrast,
            label,
            aux_cosine,
            aux_label,
            sword_contrast,
        })
    }
}

/// `num_pos` ones followed by `num_neg` zeros
fn binary_labels(num_pos: usize, num_neg: usize) -> Array1<f32> {
    Array1::from_shape_fn(num_pos + num_neg, |i| if i < num_pos { 1.0 } else { 0.0 })
}

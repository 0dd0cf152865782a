use contrastrack::{
    FrameTargets, LinearEmbeddingHead, ObjectQueueBank, OneTimeLogger, PosNegSelector, SelectionInputs,
    SelectorConfig,
};
use ndarray::{Array1, Array2, Array3, Axis};
use rand::prelude::*;
use std::sync::Arc;

const QUERIES: usize = 100;
const HIDDEN: usize = 16;
const EMBED: usize = 8;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("Testing positive/negative selection on a 10x10 query grid...");

    let mut rng = StdRng::seed_from_u64(2024);

    // Reference queries on a regular grid, with jittered class scores
    let grid = Array2::from_shape_fn((QUERIES, 4), |(q, c)| match c {
        0 => 0.05 + 0.1 * (q % 10) as f32,
        1 => 0.05 + 0.1 * (q / 10) as f32,
        _ => 0.15,
    });
    let ref_boxes = grid.insert_axis(Axis(0));
    let ref_probs = Array3::from_shape_fn((1, QUERIES, 5), |_| rng.gen_range(0.1..0.9f32));

    let targets = vec![FrameTargets::new(
        ndarray::array![[0.3, 0.3, 0.3, 0.3], [0.7, 0.6, 0.25, 0.4], [0.0, 0.0, 0.0, 0.0]],
        vec![1, 3, 0],
        vec![true, true, false],
    )?];
    let all_indices = vec![vec![4, 9, 0]];

    let hs_key = Array3::from_shape_fn((1, 12, HIDDEN), |_| rng.gen_range(-1.0..1.0f32));
    let hs_ref = Array3::from_shape_fn((1, QUERIES, HIDDEN), |_| rng.gen_range(-1.0..1.0f32));
    let head = LinearEmbeddingHead::new(
        Array2::from_shape_fn((HIDDEN, EMBED), |_| rng.gen_range(-0.5..0.5f32)),
        Array1::zeros(EMBED),
    )?;

    // Track embeddings seen so far, one queue per identity
    let mut bank = ObjectQueueBank::new(8)?;
    for _ in 0..10 {
        bank.enqueue(1, Array1::from_shape_fn(EMBED, |_| rng.gen_range(-1.0..1.0f32)))?;
    }
    let queue = bank
        .get(1)
        .ok_or_else(|| anyhow::anyhow!("track 1 has no queue"))?;
    println!("Queue for track 1 holds {} of {} embeddings", queue.len(), queue.capacity());

    let selector = PosNegSelector::new(SelectorConfig::default())?.with_sink(Arc::new(OneTimeLogger::default()));
    let inputs = SelectionInputs {
        ref_boxes: ref_boxes.view(),
        ref_probs: ref_probs.view(),
        all_indices: &all_indices,
        targets: &targets,
        key_targets: &targets,
        hs_key: hs_key.view(),
        hs_ref: hs_ref.view(),
    };

    let assignments = selector.assign(&inputs)?;
    for (inst, (strict, loose)) in assignments[0].strict.iter().zip(&assignments[0].loose).enumerate() {
        println!(
            "Instance {}: strict positives {:?}, loose positives {}",
            inst,
            strict.indices(),
            loose.indices().len()
        );
    }

    let start = std::time::Instant::now();
    let items = selector.select_pos_neg(&inputs, &head, queue, &mut rng)?;
    let duration = start.elapsed();

    println!("\nBuilt {} contrast items in {:?}", items.len(), duration);
    for (i, item) in items.iter().enumerate() {
        let num_pos = item.label.iter().filter(|&&l| l == 1.0).count();
        println!(
            "Item {}: {} positives, {} negatives, {} auxiliary pairs, sword contrast {:.4}",
            i,
            num_pos,
            item.label.len() - num_pos,
            item.aux_label.len(),
            item.sword_contrast
        );
    }

    Ok(())
}

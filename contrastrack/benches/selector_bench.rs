use contrastrack::{
    FrameTargets, LinearEmbeddingHead, ObjectQueue, PosNegSelector, SelectionInputs, SelectorConfig,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::{Array1, Array2, Array3};
use rand::prelude::*;

const BATCH: usize = 2;
const QUERIES: usize = 300;
const HIDDEN: usize = 64;
const EMBED: usize = 32;

fn random_targets(rng: &mut StdRng, n: usize) -> FrameTargets {
    let boxes = Array2::from_shape_fn((n, 4), |(_, c)| {
        if c < 2 {
            rng.gen_range(0.2..0.8)
        } else {
            rng.gen_range(0.1..0.3)
        }
    });
    let labels = (0..n).map(|_| rng.gen_range(0..10)).collect();
    FrameTargets::new(boxes, labels, vec![true; n]).expect("consistent targets")
}

fn bench_select_pos_neg(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);

    let ref_boxes = Array3::from_shape_fn((BATCH, QUERIES, 4), |(_, _, k)| {
        if k < 2 {
            rng.gen_range(0.0..1.0f32)
        } else {
            rng.gen_range(0.05..0.3f32)
        }
    });
    let ref_probs = Array3::from_shape_fn((BATCH, QUERIES, 10), |_| rng.gen_range(0.0..1.0f32));
    let hs_key = Array3::from_shape_fn((BATCH, QUERIES, HIDDEN), |_| rng.gen_range(-1.0..1.0f32));
    let hs_ref = Array3::from_shape_fn((BATCH, QUERIES, HIDDEN), |_| rng.gen_range(-1.0..1.0f32));
    let targets: Vec<FrameTargets> = (0..BATCH).map(|_| random_targets(&mut rng, 5)).collect();
    let all_indices: Vec<Vec<usize>> = (0..BATCH)
        .map(|_| (0..5).map(|_| rng.gen_range(0..QUERIES)).collect())
        .collect();

    let head = LinearEmbeddingHead::new(
        Array2::from_shape_fn((HIDDEN, EMBED), |_| rng.gen_range(-0.2..0.2f32)),
        Array1::zeros(EMBED),
    )
    .expect("matching bias");

    let mut queue = ObjectQueue::new(16).expect("non-zero capacity");
    for _ in 0..16 {
        queue
            .enqueue(Array1::from_shape_fn(EMBED, |_| rng.gen_range(-1.0..1.0f32)))
            .expect("fixed dimension");
    }

    let selector = PosNegSelector::new(SelectorConfig::default()).expect("default config");
    let inputs = SelectionInputs {
        ref_boxes: ref_boxes.view(),
        ref_probs: ref_probs.view(),
        all_indices: &all_indices,
        targets: &targets,
        key_targets: &targets,
        hs_key: hs_key.view(),
        hs_ref: hs_ref.view(),
    };

    c.bench_function("select_pos_neg_2x300", |b| {
        let mut sample_rng = StdRng::seed_from_u64(11);
        b.iter(|| selector.select_pos_neg(black_box(&inputs), &head, &queue, &mut sample_rng))
    });
}

criterion_group!(benches, bench_select_pos_neg);
criterion_main!(benches);

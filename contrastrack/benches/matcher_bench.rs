use contrastrack::bbox::{box_cxcywh_to_xyxy, box_iou, generalized_box_iou};
use contrastrack::{dynamic_k_matching, get_pos_idx, MatcherConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use rand::prelude::*;

fn generate_random_boxes(rng: &mut StdRng, n: usize) -> Array2<f32> {
    Array2::from_shape_fn((n, 4), |(_, c)| {
        if c < 2 {
            rng.gen_range(0.05..0.95)
        } else {
            rng.gen_range(0.02..0.3)
        }
    })
}

fn bench_pairwise_giou(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let preds = box_cxcywh_to_xyxy(generate_random_boxes(&mut rng, 300).view());
    let gts = box_cxcywh_to_xyxy(generate_random_boxes(&mut rng, 20).view());

    c.bench_function("box_iou_300x20", |b| {
        b.iter(|| box_iou(black_box(preds.view()), black_box(gts.view())))
    });
    c.bench_function("generalized_box_iou_300x20", |b| {
        b.iter(|| generalized_box_iou(black_box(preds.view()), black_box(gts.view())))
    });
}

fn bench_dynamic_k(c: &mut Criterion) {
    let config = MatcherConfig::default();
    let mut rng = StdRng::seed_from_u64(1);
    let mut group = c.benchmark_group("dynamic_k_matching");

    for &num_gt in &[1usize, 5, 20] {
        let cost = Array2::from_shape_fn((300, num_gt), |_| rng.gen_range(0.0..10.0f32));
        let ious = Array2::from_shape_fn((300, num_gt), |_| rng.gen_range(0.0..0.5f32));

        for &pool in &[10usize, 100] {
            group.bench_with_input(
                BenchmarkId::new(format!("pool_{}", pool), num_gt),
                &(cost.clone(), ious.clone()),
                |b, (cost, ious)| {
                    b.iter(|| {
                        dynamic_k_matching(black_box(cost.view()), black_box(ious.view()), num_gt, pool, &config)
                    })
                },
            );
        }
    }
    group.finish();
}

fn bench_get_pos_idx(c: &mut Criterion) {
    let config = MatcherConfig::default();
    let mut rng = StdRng::seed_from_u64(2);
    let boxes = generate_random_boxes(&mut rng, 300);
    let probs = Array2::from_shape_fn((300, 40), |_| rng.gen_range(0.0..1.0f32));
    let gts = generate_random_boxes(&mut rng, 8);
    let labels: Vec<usize> = (0..8).map(|_| rng.gen_range(0..40)).collect();
    let valid = vec![true, true, false, true, true, true, false, true];

    c.bench_function("get_pos_idx_300q_8gt", |b| {
        b.iter(|| {
            get_pos_idx(
                black_box(boxes.view()),
                black_box(probs.view()),
                black_box(gts.view()),
                &labels,
                &valid,
                &config,
            )
        })
    });
}

criterion_group!(benches, bench_pairwise_giou, bench_dynamic_k, bench_get_pos_idx);
criterion_main!(benches);

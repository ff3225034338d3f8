mod common;

use common::{CountingAlloc, house_sales};
use house_mlp::{DataPipeline, ProblemKind};

#[global_allocator]
static ALLOC: CountingAlloc = CountingAlloc::new();

#[test]
fn resplits_and_rebuilds_release_previous_tensors() {
    let mut pipeline = DataPipeline::with_seed(3, ProblemKind::Bedrooms.activate().problem, 50);
    pipeline.load(&mut house_sales(300)).unwrap();

    let ratios = [10_u8, 33, 50, 66, 90, 99, 1];

    // Warm up so every buffer has reached its steady-state size.
    for &ratio in &ratios {
        pipeline.split(ratio).unwrap();
    }
    pipeline.split(50).unwrap();
    let baseline = ALLOC.live_bytes();

    for _ in 0..20 {
        for &ratio in &ratios {
            let split = pipeline.split(ratio).unwrap();
            assert_eq!(split.training_size + split.testing_size, pipeline.dataset_size());
        }
    }
    pipeline.split(50).unwrap();
    assert_eq!(ALLOC.live_bytes(), baseline, "split leaked");

    for _ in 0..10 {
        pipeline.shuffle().unwrap();
    }
    pipeline.split(50).unwrap();
    assert_eq!(ALLOC.live_bytes(), baseline, "rebuild leaked");
}

//! Multi-worker loader behaviour: ordering, backpressure, failure
//! delivery, and arena cleanup.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use batch_engine::{
    Batch, DataLoader, EngineError, LoaderConfig, Pipeline, Result, TensorPool,
};
use common::{
    labeled_dataset, numbered_dataset, AddBias, CountingDataset, FailingDataset, SlowDataset,
};

#[test]
fn submission_order_survives_variable_worker_latency() -> Result<()> {
    let pool = TensorPool::new();
    let arena = pool.new_arena();
    let dataset = SlowDataset::new(numbered_dataset(12, 2), 3, Duration::from_millis(15));
    let loader = DataLoader::new(
        dataset,
        LoaderConfig::builder()
            .batch_size(2)
            .num_workers(4)
            .prefetch_depth(4)
            .build(),
    )?;

    let batches: Vec<Batch> = loader.iter(&arena)?.collect::<Result<_>>()?;
    let indices: Vec<usize> = batches.iter().flat_map(|b| b.indices().to_vec()).collect();
    assert_eq!(indices, (0..12).collect::<Vec<_>>());

    drop(batches);
    arena.close();
    assert_eq!(pool.live_tensors(), 0);
    Ok(())
}

#[test]
fn batch_values_are_correct_with_workers() -> Result<()> {
    let pool = TensorPool::new();
    let arena = pool.new_arena();
    let loader = DataLoader::new(
        numbered_dataset(6, 2),
        LoaderConfig::builder().batch_size(3).num_workers(2).build(),
    )?;

    let mut iter = loader.iter(&arena)?;
    let batch = iter.next().unwrap()?;
    let data = arena.read(batch.data()[0])?;
    assert_eq!(data.shape, vec![3, 2]);
    assert_eq!(data.values, vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
    batch.close();

    drop(iter);
    arena.close();
    Ok(())
}

#[test]
fn failed_unit_is_delivered_at_its_position() -> Result<()> {
    let pool = TensorPool::new();
    let arena = pool.new_arena();
    // Index 5 falls in the third index-batch (sequence 2) of five.
    let dataset = FailingDataset::new(numbered_dataset(10, 2), 5);
    let loader = DataLoader::new(
        dataset,
        LoaderConfig::builder()
            .batch_size(2)
            .num_workers(2)
            .prefetch_depth(3)
            .build(),
    )?;

    let results: Vec<Result<Batch>> = loader.iter(&arena)?.collect();
    assert_eq!(results.len(), 5);

    for (position, result) in results.iter().enumerate() {
        if position == 2 {
            match result {
                Err(EngineError::Worker { sequence, .. }) => assert_eq!(*sequence, 2),
                Err(other) => panic!("unexpected error kind: {other}"),
                Ok(_) => panic!("expected worker failure at position 2"),
            }
        } else {
            let batch = result.as_ref().expect("sibling batches must survive");
            assert_eq!(batch.indices(), [position * 2, position * 2 + 1]);
        }
    }

    drop(results);
    arena.close();
    assert_eq!(pool.live_tensors(), 0);
    assert_eq!(pool.arenas_opened(), pool.arenas_closed());
    Ok(())
}

#[test]
fn prefetch_depth_bounds_prepared_batches() -> Result<()> {
    let pool = TensorPool::new();
    let arena = pool.new_arena();
    let (dataset, calls) = CountingDataset::new(numbered_dataset(12, 2));
    let loader = DataLoader::new(
        dataset,
        LoaderConfig::builder()
            .batch_size(2)
            .num_workers(4)
            .prefetch_depth(2)
            .build(),
    )?;

    let mut iter = loader.iter(&arena)?;
    let first = iter.next().unwrap()?;
    first.close();

    // Give the workers ample time; with depth 2 only two units may have
    // been dispatched, regardless of how many workers are idle.
    std::thread::sleep(Duration::from_millis(200));
    let prepared_calls = calls.load(Ordering::SeqCst);
    assert!(
        prepared_calls <= 4,
        "at most 2 units of 2 records each should have started, saw {prepared_calls} gets"
    );

    let remaining: Vec<Batch> = iter.collect::<Result<_>>()?;
    assert_eq!(remaining.len(), 5);
    assert_eq!(calls.load(Ordering::SeqCst), 12);

    drop(remaining);
    arena.close();
    assert_eq!(pool.live_tensors(), 0);
    Ok(())
}

#[test]
fn dropping_the_iterator_mid_pass_releases_everything() -> Result<()> {
    let pool = TensorPool::new();
    let arena = pool.new_arena();
    let loader = DataLoader::new(
        numbered_dataset(12, 2),
        LoaderConfig::builder()
            .batch_size(2)
            .num_workers(2)
            .prefetch_depth(3)
            .build(),
    )?;

    let mut iter = loader.iter(&arena)?;
    let first = iter.next().unwrap()?;
    first.close();
    drop(iter);

    arena.close();
    assert_eq!(pool.live_tensors(), 0);
    assert_eq!(pool.arenas_opened(), pool.arenas_closed());
    Ok(())
}

#[test]
fn labels_are_batched_alongside_data() -> Result<()> {
    let pool = TensorPool::new();
    let arena = pool.new_arena();
    let loader = DataLoader::new(
        labeled_dataset(4, 2),
        LoaderConfig::builder().batch_size(2).num_workers(2).build(),
    )?;

    let batches: Vec<Batch> = loader.iter(&arena)?.collect::<Result<_>>()?;
    assert_eq!(batches.len(), 2);

    let labels = batches[1].labels().expect("labels must be present");
    let data = arena.read(labels[0])?;
    assert_eq!(data.shape, vec![2]);
    assert_eq!(data.values, vec![20.0, 30.0]);

    drop(batches);
    arena.close();
    Ok(())
}

#[test]
fn pipelines_run_inside_workers() -> Result<()> {
    let pool = TensorPool::new();
    let arena = pool.new_arena();
    let loader = DataLoader::new(
        labeled_dataset(4, 2),
        LoaderConfig::builder().batch_size(4).num_workers(2).build(),
    )?
    .with_pipeline(Pipeline::new().add(AddBias(100.0)))
    .with_label_pipeline(Pipeline::new().add(AddBias(0.5)));

    let mut iter = loader.iter(&arena)?;
    let batch = iter.next().unwrap()?;

    let data = arena.read(batch.data()[0])?;
    assert_eq!(data.values, vec![100.0, 100.0, 101.0, 101.0, 102.0, 102.0, 103.0, 103.0]);

    let labels = arena.read(batch.labels().unwrap()[0])?;
    assert_eq!(labels.values, vec![0.5, 10.5, 20.5, 30.5]);

    batch.close();
    drop(iter);
    arena.close();
    assert_eq!(pool.live_tensors(), 0);
    Ok(())
}

#[test]
fn multiple_passes_reuse_the_loader() -> Result<()> {
    let pool = TensorPool::new();
    let arena = pool.new_arena();
    let loader = DataLoader::new(
        numbered_dataset(8, 2),
        LoaderConfig::builder().batch_size(2).num_workers(2).build(),
    )?;

    for _ in 0..3 {
        let pass_arena = arena.new_child()?;
        let count = loader
            .iter(&pass_arena)?
            .collect::<Result<Vec<_>>>()?
            .len();
        assert_eq!(count, 4);
        pass_arena.close();
        assert_eq!(pool.live_tensors(), 0);
    }

    arena.close();
    assert_eq!(pool.arenas_opened(), pool.arenas_closed());
    Ok(())
}

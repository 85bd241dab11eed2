//! Shared test doubles: datasets, translators, and backends with
//! controllable latency, failure, and call counting.

#![allow(dead_code)]

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use batch_engine::{
    Arena, ComputeBackend, Dataset, Device, InMemoryDataset, Record, TensorData, TensorList,
    Transform, Translator, TranslatorContext,
};

/// Rows where record `i` is a single `[width]` tensor filled with `i`.
pub fn numbered_rows(n: usize, width: usize) -> Vec<Vec<TensorData>> {
    (0..n)
        .map(|i| vec![TensorData::new(vec![width as i64], vec![i as f32; width])])
        .collect()
}

pub fn numbered_dataset(n: usize, width: usize) -> InMemoryDataset {
    InMemoryDataset::new(numbered_rows(n, width))
}

/// Scalar labels: record `i` gets label `i * 10`.
pub fn labeled_dataset(n: usize, width: usize) -> InMemoryDataset {
    let labels = (0..n)
        .map(|i| vec![TensorData::scalar(i as f32 * 10.0)])
        .collect();
    InMemoryDataset::with_labels(numbered_rows(n, width), labels).unwrap()
}

/// Delays each `get` by `(index % cycle) * step` to scramble completion
/// order across workers.
pub struct SlowDataset {
    inner: InMemoryDataset,
    cycle: usize,
    step: Duration,
}

impl SlowDataset {
    pub fn new(inner: InMemoryDataset, cycle: usize, step: Duration) -> Self {
        Self { inner, cycle, step }
    }
}

impl Dataset for SlowDataset {
    fn get(&self, arena: &Arena, index: usize) -> Result<Record> {
        std::thread::sleep(self.step * (index % self.cycle) as u32);
        self.inner.get(arena, index)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Fails `get` for one specific index.
pub struct FailingDataset {
    inner: InMemoryDataset,
    fail_index: usize,
}

impl FailingDataset {
    pub fn new(inner: InMemoryDataset, fail_index: usize) -> Self {
        Self { inner, fail_index }
    }
}

impl Dataset for FailingDataset {
    fn get(&self, arena: &Arena, index: usize) -> Result<Record> {
        if index == self.fail_index {
            bail!("record {index} is corrupt");
        }
        self.inner.get(arena, index)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Counts `get` calls.
pub struct CountingDataset {
    inner: InMemoryDataset,
    calls: Arc<AtomicUsize>,
}

impl CountingDataset {
    pub fn new(inner: InMemoryDataset) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl Dataset for CountingDataset {
    fn get(&self, arena: &Arena, index: usize) -> Result<Record> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(arena, index)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Adds a constant to every element of every tensor.
pub struct AddBias(pub f32);

impl Transform for AddBias {
    fn apply(&self, arena: &Arena, input: TensorList) -> Result<TensorList> {
        let mut output = Vec::with_capacity(input.len());
        for tensor in input {
            let mut data = arena.read(tensor)?;
            for v in &mut data.values {
                *v += self.0;
            }
            output.push(arena.alloc(data.shape, data.values)?);
        }
        Ok(output)
    }
}

/// Adds 1.0 to every element, counting invocations and completion barriers.
pub struct AddOneBackend {
    pub compute_calls: AtomicUsize,
    pub barrier_calls: AtomicUsize,
}

impl AddOneBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            compute_calls: AtomicUsize::new(0),
            barrier_calls: AtomicUsize::new(0),
        })
    }
}

impl ComputeBackend for AddOneBackend {
    fn compute(&self, arena: &Arena, inputs: &TensorList, _device: Device) -> Result<TensorList> {
        self.compute_calls.fetch_add(1, Ordering::SeqCst);
        let mut outputs = Vec::with_capacity(inputs.len());
        for &tensor in inputs {
            let mut data = arena.read(tensor)?;
            for v in &mut data.values {
                *v += 1.0;
            }
            outputs.push(arena.alloc(data.shape, data.values)?);
        }
        Ok(outputs)
    }

    fn wait_for_completion(&self) -> Result<()> {
        self.barrier_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Always fails.
pub struct FailingBackend;

impl ComputeBackend for FailingBackend {
    fn compute(&self, _arena: &Arena, _inputs: &TensorList, _device: Device) -> Result<TensorList> {
        bail!("device lost");
    }
}

/// Encodes a `Vec<f32>` as one `[len]` tensor and decodes it back.
pub struct VecTranslator {
    batched: bool,
}

impl VecTranslator {
    pub fn new() -> Self {
        Self { batched: true }
    }

    /// A variant that opts out of batching.
    pub fn unbatched() -> Self {
        Self { batched: false }
    }
}

impl Translator<Vec<f32>, Vec<f32>> for VecTranslator {
    fn encode(&self, ctx: &TranslatorContext<'_>, input: &Vec<f32>) -> Result<TensorList> {
        if input.is_empty() {
            bail!("cannot encode an empty example");
        }
        let tensor = ctx
            .arena()
            .alloc(vec![input.len() as i64], input.clone())?;
        Ok(vec![tensor])
    }

    fn decode(&self, ctx: &TranslatorContext<'_>, output: TensorList) -> Result<Vec<f32>> {
        Ok(ctx.arena().read(output[0])?.values)
    }

    fn batchifier(&self) -> Option<Box<dyn batch_engine::Batchifier>> {
        if self.batched {
            Some(Box::new(batch_engine::StackBatchifier))
        } else {
            None
        }
    }
}

/// Decode always fails with an already-typed engine error, to verify the
/// predictor does not wrap it a second time.
pub struct TypedDecodeFailure;

impl Translator<Vec<f32>, Vec<f32>> for TypedDecodeFailure {
    fn encode(&self, ctx: &TranslatorContext<'_>, input: &Vec<f32>) -> Result<TensorList> {
        let tensor = ctx
            .arena()
            .alloc(vec![input.len() as i64], input.clone())?;
        Ok(vec![tensor])
    }

    fn decode(&self, _ctx: &TranslatorContext<'_>, _output: TensorList) -> Result<Vec<f32>> {
        Err(anyhow::Error::new(batch_engine::EngineError::EmptyBatch))
    }
}

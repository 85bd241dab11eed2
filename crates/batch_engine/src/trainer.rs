//! Training entry point: per-batch forward passes with guaranteed disposal.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::arena::{Arena, ArenaGuard};
use crate::backend::ComputeBackend;
use crate::batch::Batch;
use crate::dataset::Dataset;
use crate::error::{EngineError, Result};
use crate::loader::DataLoader;
use crate::metrics::MetricsSink;
use crate::tensor::{Device, TensorData};

/// Drives batches through a compute backend, one step per batch.
///
/// Each step runs on a fresh child arena that is closed when the step ends,
/// and the batch itself is consumed, so tensor memory is released whether
/// the step succeeded or not. Step outputs are copied out of the step arena
/// before it closes.
pub struct Trainer {
    backend: Arc<dyn ComputeBackend>,
    arena: Arena,
    device: Device,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl Trainer {
    pub fn new(parent: &Arena, backend: Arc<dyn ComputeBackend>, device: Device) -> Result<Self> {
        Ok(Self {
            backend,
            arena: parent.new_child()?,
            device,
            metrics: None,
        })
    }

    /// Attaches a sink for per-step timings.
    pub fn set_metrics(&mut self, metrics: Arc<dyn MetricsSink>) {
        self.metrics = Some(metrics);
    }

    /// Runs one training step and consumes the batch.
    pub fn train(&self, batch: Batch) -> Result<Vec<TensorData>> {
        let result = self.step(&batch, "train_step");
        batch.close();
        result
    }

    /// Runs one evaluation step and consumes the batch.
    pub fn validate(&self, batch: Batch) -> Result<Vec<TensorData>> {
        let result = self.step(&batch, "validate_step");
        batch.close();
        result
    }

    /// Runs a full pass of `loader`, training on every batch. Returns the
    /// number of steps taken.
    pub fn fit_epoch<D: Dataset + 'static>(&self, loader: &DataLoader<D>) -> Result<usize> {
        let pass_arena = self.arena.new_child()?;
        let _guard = ArenaGuard::new(&pass_arena);

        let mut steps = 0;
        for batch in loader.iter(&pass_arena)? {
            self.train(batch?)?;
            steps += 1;
        }
        debug!(steps, "finished training pass");
        Ok(steps)
    }

    /// Releases the trainer's arena. Dropping has the same effect.
    pub fn close(self) {
        self.arena.close();
    }

    fn step(&self, batch: &Batch, label: &str) -> Result<Vec<TensorData>> {
        let step_arena = self.arena.new_child()?;
        let _guard = ArenaGuard::new(&step_arena);

        let clock = Instant::now();
        let outputs = self
            .backend
            .compute(&step_arena, batch.data(), self.device)
            .map_err(EngineError::Compute)?;
        self.backend
            .wait_for_completion()
            .map_err(EngineError::Compute)?;
        if let Some(metrics) = &self.metrics {
            metrics.record(label, clock.elapsed(), "ns");
        }

        let mut results = Vec::with_capacity(outputs.len());
        for tensor in outputs {
            results.push(step_arena.read(tensor)?);
        }
        Ok(results)
    }
}

impl Drop for Trainer {
    fn drop(&mut self) {
        self.arena.close();
    }
}

//! Inference entry point: encode, batchify, compute, unbatchify, decode.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::arena::{Arena, ArenaGuard};
use crate::backend::ComputeBackend;
use crate::error::{EngineError, Result};
use crate::metrics::MetricsSink;
use crate::tensor::Device;
use crate::translator::{Translator, TranslatorContext};

/// Runs batched inference over a translator and a compute backend.
///
/// The predictor owns a child arena of the arena it was constructed under.
/// Every `batch_predict` call opens two further children (input side and
/// output side) and closes them before returning, success or failure, so no
/// per-call tensors outlive the call.
pub struct Predictor<I, O> {
    translator: Box<dyn Translator<I, O>>,
    backend: Arc<dyn ComputeBackend>,
    arena: Arena,
    device: Device,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl<I, O> Predictor<I, O> {
    pub fn new(
        parent: &Arena,
        translator: Box<dyn Translator<I, O>>,
        backend: Arc<dyn ComputeBackend>,
        device: Device,
    ) -> Result<Self> {
        Ok(Self {
            translator,
            backend,
            arena: parent.new_child()?,
            device,
            metrics: None,
        })
    }

    /// Attaches a sink for encode/compute/decode phase timings.
    pub fn set_metrics(&mut self, metrics: Arc<dyn MetricsSink>) {
        self.metrics = Some(metrics);
    }

    /// Predicts a single input.
    pub fn predict(&self, input: &I) -> Result<O> {
        self.batch_predict(std::slice::from_ref(input))?
            .pop()
            .ok_or(EngineError::EmptyBatch)
    }

    /// Predicts a batch of inputs. Outputs come back in input order; an
    /// empty input slice yields an empty output.
    pub fn batch_predict(&self, inputs: &[I]) -> Result<Vec<O>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let input_arena = self.arena.new_child()?;
        let _input_guard = ArenaGuard::new(&input_arena);
        let output_arena = self.arena.new_child()?;
        let _output_guard = ArenaGuard::new(&output_arena);

        let in_ctx = TranslatorContext::new(&input_arena, self.device);
        let out_ctx = TranslatorContext::new(&output_arena, self.device);

        match self.translator.batchifier() {
            None => {
                // The translator opted out of batching: one computation per
                // example, outputs in input order.
                debug!(inputs = inputs.len(), "predicting without batching");
                let mut outputs = Vec::with_capacity(inputs.len());
                for input in inputs {
                    let mut clock = Instant::now();
                    let encoded = self
                        .translator
                        .encode(&in_ctx, input)
                        .map_err(|e| EngineError::translation("encode", e))?;
                    self.observe("encode", &mut clock);

                    let result = self
                        .backend
                        .compute(&input_arena, &encoded, self.device)
                        .map_err(EngineError::Compute)?;
                    self.backend
                        .wait_for_completion()
                        .map_err(EngineError::Compute)?;
                    self.observe("compute", &mut clock);

                    let output = self
                        .translator
                        .decode(&out_ctx, result)
                        .map_err(|e| EngineError::translation("decode", e))?;
                    self.observe("decode", &mut clock);
                    outputs.push(output);
                }
                Ok(outputs)
            }
            Some(batchifier) => {
                debug!(inputs = inputs.len(), "predicting as one batch");
                let mut clock = Instant::now();
                let mut encoded = Vec::with_capacity(inputs.len());
                for input in inputs {
                    encoded.push(
                        self.translator
                            .encode(&in_ctx, input)
                            .map_err(|e| EngineError::translation("encode", e))?,
                    );
                }
                let batched = batchifier.batchify(&input_arena, &encoded)?;
                self.observe("encode", &mut clock);

                let result = self
                    .backend
                    .compute(&input_arena, &batched, self.device)
                    .map_err(EngineError::Compute)?;
                // Stop the compute clock only once results are actually
                // materialized, not when the backend call returns.
                self.backend
                    .wait_for_completion()
                    .map_err(EngineError::Compute)?;
                self.observe("compute", &mut clock);

                let unbatched = batchifier.unbatchify(&output_arena, &result, inputs.len())?;
                let mut outputs = Vec::with_capacity(unbatched.len());
                for tensors in unbatched {
                    outputs.push(
                        self.translator
                            .decode(&out_ctx, tensors)
                            .map_err(|e| EngineError::translation("decode", e))?,
                    );
                }
                self.observe("decode", &mut clock);
                Ok(outputs)
            }
        }
    }

    /// Releases the predictor's arena. Dropping has the same effect.
    pub fn close(self) {
        self.arena.close();
    }

    fn observe(&self, phase: &str, clock: &mut Instant) {
        if let Some(metrics) = &self.metrics {
            let now = Instant::now();
            metrics.record(phase, now.duration_since(*clock), "ns");
            *clock = now;
        }
    }
}

impl<I, O> Drop for Predictor<I, O> {
    fn drop(&mut self) {
        self.arena.close();
    }
}

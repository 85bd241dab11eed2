//! The compute seam: the engine hands batched tensors to an opaque backend.

use anyhow::Result;

use crate::arena::Arena;
use crate::tensor::{Device, TensorList};

/// Runs the actual computation over batched tensors.
///
/// Output tensors belong to `arena`. Backends may return asynchronously
/// scheduled results; [`wait_for_completion`](ComputeBackend::wait_for_completion)
/// is the barrier the engine calls before trusting that results are
/// materialized and before stopping its compute clock.
pub trait ComputeBackend: Send + Sync {
    fn compute(&self, arena: &Arena, inputs: &TensorList, device: Device) -> Result<TensorList>;

    /// Blocks until all previously issued work is finished. Synchronous
    /// backends need not override the no-op default.
    fn wait_for_completion(&self) -> Result<()> {
        Ok(())
    }
}

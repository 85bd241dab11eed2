//! Translators convert between user types and tensor lists.

use anyhow::Result;

use crate::arena::Arena;
use crate::batchifier::{Batchifier, StackBatchifier};
use crate::tensor::{Device, TensorList};

/// What a translator sees during a phase: the arena scoping the tensors it
/// allocates, and the target device.
pub struct TranslatorContext<'a> {
    arena: &'a Arena,
    device: Device,
}

impl<'a> TranslatorContext<'a> {
    pub(crate) fn new(arena: &'a Arena, device: Device) -> Self {
        Self { arena, device }
    }

    pub fn arena(&self) -> &Arena {
        self.arena
    }

    pub fn device(&self) -> Device {
        self.device
    }
}

/// Converts inputs of type `I` into tensors and result tensors into outputs
/// of type `O`.
///
/// `encode` tensors live in the input-side arena, `decode` receives tensors
/// from the output-side arena; both are torn down by the predictor when the
/// call finishes, so translators never manage tensor lifetime themselves.
pub trait Translator<I, O>: Send + Sync {
    fn encode(&self, ctx: &TranslatorContext<'_>, input: &I) -> Result<TensorList>;

    fn decode(&self, ctx: &TranslatorContext<'_>, output: TensorList) -> Result<O>;

    /// The batchifier merging encoded inputs for a single computation.
    /// Returning `None` opts out of batching; the engine then computes once
    /// per example.
    fn batchifier(&self) -> Option<Box<dyn Batchifier>> {
        Some(Box::new(StackBatchifier))
    }
}

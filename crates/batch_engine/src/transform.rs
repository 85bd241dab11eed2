//! Per-record transforms applied by the loader before batchifying.

use anyhow::Result;

use crate::arena::Arena;
use crate::tensor::TensorList;

/// A per-record processing step. Output tensors are allocated into the same
/// arena as the input record, so they share the record's lifetime.
pub trait Transform: Send + Sync {
    fn apply(&self, arena: &Arena, input: TensorList) -> Result<TensorList>;
}

/// An ordered chain of [`Transform`]s.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, transform: impl Transform + 'static) -> Self {
        self.stages.push(Box::new(transform));
        self
    }

    pub fn apply(&self, arena: &Arena, input: TensorList) -> Result<TensorList> {
        let mut current = input;
        for stage in &self.stages {
            current = stage.apply(arena, current)?;
        }
        Ok(current)
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

//! Tensor value and handle types.
//!
//! The engine does not run kernels itself, so a tensor is a shape plus a flat
//! `f32` buffer. Buffers live in the central [`TensorPool`](crate::arena::TensorPool);
//! user code holds cheap [`Tensor`] handles and resolves them through the
//! arena that scopes their lifetime.

/// Placement target for a batch or computation. The engine passes the device
/// through to the backend and never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
}

/// An owned tensor value: a shape and its row-major element buffer.
///
/// `values.len()` must equal the product of `shape`. Rank-0 tensors (empty
/// shape) hold exactly one element.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorData {
    pub shape: Vec<i64>,
    pub values: Vec<f32>,
}

impl TensorData {
    pub fn new(shape: Vec<i64>, values: Vec<f32>) -> Self {
        debug_assert_eq!(
            shape.iter().product::<i64>().max(0) as usize,
            values.len(),
            "tensor buffer length must match shape product"
        );
        Self { shape, values }
    }

    pub fn scalar(value: f32) -> Self {
        Self {
            shape: Vec::new(),
            values: vec![value],
        }
    }

    pub fn element_count(&self) -> usize {
        self.shape.iter().product::<i64>().max(0) as usize
    }
}

/// A copyable handle to a pooled tensor buffer.
///
/// The handle carries the slot's generation; once the owning arena releases
/// the slot, the handle goes stale and any read through it is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tensor {
    pub(crate) slot: u32,
    pub(crate) generation: u32,
}

/// The positional tensor list flowing between encode, batchify, compute,
/// and decode.
pub type TensorList = Vec<Tensor>;

//! A batched execution engine for ML inference and training.
//!
//! The engine turns streams of individual examples into device-ready tensor
//! batches, runs an opaque computation over them, and converts results back
//! to per-example outputs. Tensor memory is owned by a tree of scoped
//! arenas backed by a central pool, and batch preparation overlaps with
//! compute through a bounded prefetching worker pool.
//!
//! # Building blocks
//! - [`arena`]: the [`TensorPool`](arena::TensorPool) and [`Arena`](arena::Arena)
//!   scope tree that own all tensor buffers.
//! - [`sampler`] + [`batchifier`]: index ordering and record stacking.
//! - [`loader`]: the [`DataLoader`](loader::DataLoader), which prefetches
//!   batches in parallel while preserving submission order.
//! - [`predictor`] / [`trainer`]: the execution front ends, wiring a
//!   [`Translator`](translator::Translator) and a
//!   [`ComputeBackend`](backend::ComputeBackend) together with phase timing
//!   and guaranteed arena cleanup.
//!
//! # Example
//! ```ignore
//! let pool = TensorPool::new();
//! let root = pool.new_arena();
//!
//! let loader = DataLoader::new(
//!     dataset,
//!     LoaderConfig::builder().batch_size(32).num_workers(4).build(),
//! )?;
//! let trainer = Trainer::new(&root, backend, Device::Cpu)?;
//! trainer.fit_epoch(&loader)?;
//!
//! root.close();
//! ```

pub mod arena;
pub mod backend;
pub mod batch;
pub mod batchifier;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod predictor;
pub mod registry;
pub mod sampler;
pub mod tensor;
pub mod trainer;
pub mod transform;
pub mod translator;

pub use arena::{Arena, TensorPool};
pub use backend::ComputeBackend;
pub use batch::Batch;
pub use batchifier::{Batchifier, StackBatchifier};
pub use dataset::{Dataset, InMemoryDataset, Record};
pub use error::{EngineError, Result};
pub use loader::{BatchIterator, DataLoader, LoaderConfig};
pub use metrics::{MetricEntry, Metrics, MetricsSink};
pub use predictor::Predictor;
pub use registry::TranslatorRegistry;
pub use sampler::{BatchSampler, RandomSampler, Sampler, SequentialSampler};
pub use tensor::{Device, Tensor, TensorData, TensorList};
pub use trainer::Trainer;
pub use transform::{Pipeline, Transform};
pub use translator::{Translator, TranslatorContext};

//! Batch loading with optional parallel prefetch.
//!
//! # Architecture
//!
//! ```text
//! Sampler ──▶ index-batches ──▶ [dispatch] ──▶ worker pool
//!                                                  │ fetch + pipeline + batchify
//!                                                  ▼
//!                              reorder buffer ◀── (sequence, Result<Batch>)
//!                                    │
//!                                    ▼
//!                          batches in submission order
//! ```
//!
//! - [`config`]: the `LoaderConfig` builder.
//! - [`pool`]: the worker thread pool (bounded channels, join on drop).
//! - [`iterator`]: the `DataLoader` and its ordering/backpressure logic.

pub mod config;
pub mod iterator;
pub(crate) mod pool;

pub use config::{LoaderConfig, LoaderConfigBuilder};
pub use iterator::{BatchIterator, DataLoader};

//! Configuration for DataLoader behaviour.
//!
//! Example:
//! ```ignore
//! let config = LoaderConfig::builder()
//!     .batch_size(32)
//!     .num_workers(4)
//!     .prefetch_depth(2)
//!     .shuffle(true)
//!     .seed(42)
//!     .build();
//! ```

use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::tensor::Device;

/// Configuration for a [`DataLoader`](crate::loader::DataLoader).
#[derive(Clone)]
pub struct LoaderConfig {
    /// Number of records per batch. Default: 1.
    pub batch_size: usize,
    /// Number of parallel prefetch workers (0 = prepare inline on `next()`).
    pub num_workers: usize,
    /// Whether to drop the last incomplete batch. Default: false.
    pub drop_last: bool,
    /// Whether to reshuffle indices each epoch. Default: false.
    pub shuffle: bool,
    /// Base RNG seed for reproducible shuffling. Default: 0.
    pub seed: u64,
    /// Maximum number of prepared-but-unconsumed batches. Producers block
    /// once this many are outstanding. Default: 2.
    pub prefetch_depth: usize,
    /// Cap on batches per pass, applied after sampling. Default: unlimited.
    pub max_iterations: Option<usize>,
    /// Maximum time to wait for the next batch from workers before assuming
    /// they are stuck. Default: 30s.
    pub timeout: Duration,
    /// Device stamped onto every yielded batch. Default: CPU.
    pub device: Device,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            num_workers: 0,
            drop_last: false,
            shuffle: false,
            seed: 0,
            prefetch_depth: 2,
            max_iterations: None,
            timeout: Duration::from_secs(30),
            device: Device::Cpu,
        }
    }
}

impl LoaderConfig {
    pub fn builder() -> LoaderConfigBuilder {
        LoaderConfigBuilder::default()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EngineError::InvalidConfig(
                "batch_size must be > 0".into(),
            ));
        }
        if self.prefetch_depth == 0 {
            return Err(EngineError::InvalidConfig(
                "prefetch_depth must be > 0".into(),
            ));
        }
        if self.max_iterations == Some(0) {
            return Err(EngineError::InvalidConfig(
                "max_iterations must be > 0 when set".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`LoaderConfig`] with method chaining.
#[derive(Default)]
pub struct LoaderConfigBuilder {
    config: LoaderConfig,
}

impl LoaderConfigBuilder {
    /// Set the batch size (must be > 0).
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the number of prefetch workers.
    pub fn num_workers(mut self, workers: usize) -> Self {
        self.config.num_workers = workers;
        self
    }

    /// Set whether to drop the last incomplete batch.
    pub fn drop_last(mut self, drop: bool) -> Self {
        self.config.drop_last = drop;
        self
    }

    /// Set whether to reshuffle indices every epoch.
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.config.shuffle = shuffle;
        self
    }

    /// Set the base seed for reproducible shuffling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Set the prefetch depth.
    ///
    /// Higher values smooth over uneven preparation latency but hold more
    /// prepared batches (and their tensor memory) at once.
    pub fn prefetch_depth(mut self, depth: usize) -> Self {
        self.config.prefetch_depth = depth;
        self
    }

    /// Cap the number of batches yielded per pass.
    pub fn max_iterations(mut self, limit: usize) -> Self {
        self.config.max_iterations = Some(limit);
        self
    }

    /// Set the timeout for waiting on worker output.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the device stamped onto yielded batches.
    pub fn device(mut self, device: Device) -> Self {
        self.config.device = device;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> LoaderConfig {
        self.config
    }
}

//! Sampling strategies: the order in which dataset indices are visited.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{EngineError, Result};

/// A `Sampler` defines the order in which dataset indices are drawn.
///
/// `iter(epoch)` returns the full sequence for that epoch. Samplers derive
/// their RNG from `base_seed + epoch`, so the same seed reproduces the same
/// order for a given epoch while successive epochs see fresh permutations.
///
/// Implementations must be `Send + Sync` so one sampler instance can be
/// shared across loader worker threads.
pub trait Sampler: Send + Sync {
    type Item: Send + Sync;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send + '_>;
}

/// Yields indices in ascending order `0, 1, ..., dataset_size - 1`.
#[derive(Debug, Clone)]
pub struct SequentialSampler {
    dataset_size: usize,
}

impl SequentialSampler {
    pub fn new(dataset_size: usize) -> Self {
        Self { dataset_size }
    }
}

impl Sampler for SequentialSampler {
    type Item = usize;

    fn iter(&self, _epoch: usize) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        Box::new(0..self.dataset_size)
    }
}

/// Yields a fresh deterministic permutation of `0..dataset_size` per epoch.
///
/// Each epoch's permutation is seeded with `base_seed + epoch`: the same
/// base seed reproduces identical orders across runs, while each epoch sees
/// the data in a different order.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    dataset_size: usize,
    base_seed: u64,
}

impl RandomSampler {
    pub fn new(dataset_size: usize, base_seed: u64) -> Result<Self> {
        if dataset_size == 0 {
            return Err(EngineError::InvalidConfig(
                "cannot sample from an empty dataset".into(),
            ));
        }
        Ok(Self {
            dataset_size,
            base_seed,
        })
    }

    #[inline]
    fn derive_rng_for_epoch(&self, epoch: usize) -> StdRng {
        StdRng::seed_from_u64(self.base_seed.wrapping_add(epoch as u64))
    }
}

impl Sampler for RandomSampler {
    type Item = usize;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        let mut rng = self.derive_rng_for_epoch(epoch);
        let mut indices: Vec<_> = (0..self.dataset_size).collect();
        indices.shuffle(&mut rng);
        Box::new(indices.into_iter())
    }
}

/// Wraps a [`Sampler`] to yield index-batches of up to `batch_size` items.
///
/// If `drop_last` is true, a final batch smaller than `batch_size` is
/// discarded instead of yielded.
#[derive(Debug, Clone)]
pub struct BatchSampler<S> {
    sampler: S,
    batch_size: usize,
    drop_last: bool,
}

impl<S: Sampler> BatchSampler<S> {
    pub fn new(sampler: S, batch_size: usize, drop_last: bool) -> Result<Self> {
        if batch_size == 0 {
            return Err(EngineError::InvalidConfig(
                "batch_size must be > 0".into(),
            ));
        }
        Ok(Self {
            sampler,
            batch_size,
            drop_last,
        })
    }
}

impl<S: Sampler> Sampler for BatchSampler<S> {
    type Item = Vec<S::Item>;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send + '_> {
        let mut sampler_iter = self.sampler.iter(epoch);
        let batch_size = self.batch_size;
        let drop_last = self.drop_last;

        Box::new(std::iter::from_fn(move || {
            let mut batch = Vec::with_capacity(batch_size);
            for _ in 0..batch_size {
                if let Some(item) = sampler_iter.next() {
                    batch.push(item);
                } else {
                    break;
                }
            }
            if batch.len() == batch_size || (!drop_last && !batch.is_empty()) {
                Some(batch)
            } else {
                None
            }
        }))
    }
}

//! The DataLoader and its prefetching iterator.
//!
//! A pass over the dataset turns the sampler's index-batches into prepared
//! [`Batch`]es. Each index-batch is one unit of work: open a child arena of
//! the caller's arena, fetch every record into it, run the pipelines,
//! batchify, and wrap the result. With workers, units are dispatched with a
//! sequence number and a reorder buffer delivers them in submission order
//! regardless of completion order.
//!
//! # Backpressure
//! At most `prefetch_depth` units are outstanding (dispatched or reordered
//! but unconsumed), and the worker output channel is bounded at the same
//! depth. Dispatch never exceeds the depth, so worker sends never block and
//! tearing the iterator down cannot deadlock.
//!
//! # Failure
//! A failed unit closes its arena and is delivered as
//! [`EngineError::Worker`] at the position its batch would have occupied.
//! Units already dispatched still complete and are delivered.

use anyhow::{anyhow, bail, Context};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::arena::Arena;
use crate::batch::Batch;
use crate::batchifier::{Batchifier, StackBatchifier};
use crate::dataset::Dataset;
use crate::error::{EngineError, Result};
use crate::loader::config::LoaderConfig;
use crate::loader::pool::WorkerPool;
use crate::sampler::{BatchSampler, RandomSampler, Sampler, SequentialSampler};
use crate::tensor::TensorList;
use crate::transform::Pipeline;

/// How often idle workers check the shutdown flag.
const WORKER_POLL: Duration = Duration::from_millis(50);

/// Turns a [`Dataset`] into an iterator of prepared [`Batch`]es.
///
/// Each call to [`iter`](DataLoader::iter) starts one pass and bumps the
/// epoch counter, so successive passes reshuffle when `shuffle` is enabled.
pub struct DataLoader<D: Dataset + 'static> {
    dataset: Arc<D>,
    config: LoaderConfig,
    pipeline: Option<Arc<Pipeline>>,
    label_pipeline: Option<Arc<Pipeline>>,
    batchifier: Arc<dyn Batchifier>,
    epoch: AtomicUsize,
}

impl<D: Dataset + 'static> DataLoader<D> {
    pub fn new(dataset: D, config: LoaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            dataset: Arc::new(dataset),
            config,
            pipeline: None,
            label_pipeline: None,
            batchifier: Arc::new(StackBatchifier),
            epoch: AtomicUsize::new(0),
        })
    }

    /// Transform chain applied to every record's data tensors.
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(Arc::new(pipeline));
        self
    }

    /// Transform chain applied to every record's label tensors.
    pub fn with_label_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.label_pipeline = Some(Arc::new(pipeline));
        self
    }

    /// Replaces the default [`StackBatchifier`].
    pub fn with_batchifier(mut self, batchifier: impl Batchifier + 'static) -> Self {
        self.batchifier = Arc::new(batchifier);
        self
    }

    /// Number of batches one pass will yield.
    pub fn batches_per_epoch(&self) -> usize {
        let n = self.dataset.len();
        let full = n / self.config.batch_size;
        let total = if self.config.drop_last || n % self.config.batch_size == 0 {
            full
        } else {
            full + 1
        };
        match self.config.max_iterations {
            Some(limit) => total.min(limit),
            None => total,
        }
    }

    /// Starts a pass. Batch arenas are children of `arena`, so yielded
    /// batches stay valid after the iterator is dropped and closing `arena`
    /// is always sufficient to release everything the pass produced.
    pub fn iter(&self, arena: &Arena) -> Result<BatchIterator<D>> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst);
        let queue = self.index_batches(epoch)?;
        debug!(
            epoch,
            batches = queue.len(),
            num_workers = self.config.num_workers,
            "starting loader pass"
        );

        let ctx = Arc::new(PrepareContext {
            dataset: self.dataset.clone(),
            pipeline: self.pipeline.clone(),
            label_pipeline: self.label_pipeline.clone(),
            batchifier: self.batchifier.clone(),
            arena: arena.clone(),
            device: self.config.device,
        });

        let mode = if self.config.num_workers == 0 {
            IterMode::Inline
        } else {
            let worker_ctx = ctx.clone();
            let pool = WorkerPool::new(
                self.config.num_workers,
                self.config.prefetch_depth,
                move |task_rx, output_tx, shutdown| {
                    run_worker(&worker_ctx, task_rx, output_tx, shutdown)
                },
            )?;
            IterMode::Workers {
                pool,
                in_flight: 0,
                ready: BTreeMap::new(),
                next_yield: 0,
                prefetch_depth: self.config.prefetch_depth,
                timeout: self.config.timeout,
            }
        };

        Ok(BatchIterator {
            queue,
            ctx,
            next_submit: 0,
            mode,
        })
    }

    fn index_batches(&self, epoch: usize) -> Result<VecDeque<Vec<usize>>> {
        if self.dataset.is_empty() {
            return Ok(VecDeque::new());
        }
        let queue = if self.config.shuffle {
            let sampler = BatchSampler::new(
                RandomSampler::new(self.dataset.len(), self.config.seed)?,
                self.config.batch_size,
                self.config.drop_last,
            )?;
            let batches = sampler.iter(epoch);
            match self.config.max_iterations {
                Some(limit) => batches.take(limit).collect(),
                None => batches.collect(),
            }
        } else {
            let sampler = BatchSampler::new(
                SequentialSampler::new(self.dataset.len()),
                self.config.batch_size,
                self.config.drop_last,
            )?;
            let batches = sampler.iter(epoch);
            match self.config.max_iterations {
                Some(limit) => batches.take(limit).collect(),
                None => batches.collect(),
            }
        };
        Ok(queue)
    }
}

/// Everything a prefetch unit needs, shared between the consumer thread and
/// the worker pool.
struct PrepareContext<D> {
    dataset: Arc<D>,
    pipeline: Option<Arc<Pipeline>>,
    label_pipeline: Option<Arc<Pipeline>>,
    batchifier: Arc<dyn Batchifier>,
    arena: Arena,
    device: crate::tensor::Device,
}

struct PrefetchTask {
    sequence: usize,
    indices: Vec<usize>,
}

/// One pass over the dataset. Yields batches in submission order.
pub struct BatchIterator<D: Dataset + 'static> {
    queue: VecDeque<Vec<usize>>,
    ctx: Arc<PrepareContext<D>>,
    next_submit: usize,
    mode: IterMode,
}

enum IterMode {
    Inline,
    Workers {
        pool: WorkerPool<PrefetchTask, (usize, Result<Batch>)>,
        in_flight: usize,
        ready: BTreeMap<usize, Result<Batch>>,
        next_yield: usize,
        prefetch_depth: usize,
        timeout: Duration,
    },
}

impl<D: Dataset + 'static> Iterator for BatchIterator<D> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Result<Batch>> {
        match &mut self.mode {
            IterMode::Inline => {
                let indices = self.queue.pop_front()?;
                let sequence = self.next_submit;
                self.next_submit += 1;
                Some(
                    prepare_batch(&self.ctx, &indices)
                        .map_err(|source| EngineError::Worker { sequence, source }),
                )
            }
            IterMode::Workers {
                pool,
                in_flight,
                ready,
                next_yield,
                prefetch_depth,
                timeout,
            } => {
                // Top up to the prefetch depth. `in_flight + ready` bounds
                // the prepared-but-unconsumed units.
                while *in_flight + ready.len() < *prefetch_depth {
                    let Some(indices) = self.queue.pop_front() else {
                        break;
                    };
                    let task = PrefetchTask {
                        sequence: self.next_submit,
                        indices,
                    };
                    if !pool.send(task) {
                        return Some(Err(EngineError::Worker {
                            sequence: self.next_submit,
                            source: anyhow!("worker pool shut down while dispatching"),
                        }));
                    }
                    self.next_submit += 1;
                    *in_flight += 1;
                }

                if *in_flight == 0 && ready.is_empty() {
                    return None;
                }

                // Wait until the next batch in submission order is ready.
                loop {
                    if let Some(result) = ready.remove(next_yield) {
                        *next_yield += 1;
                        return Some(result);
                    }
                    match pool.output_rx().recv_timeout(*timeout) {
                        Ok((sequence, result)) => {
                            *in_flight -= 1;
                            ready.insert(sequence, result);
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            warn!(sequence = *next_yield, "timed out waiting for batch");
                            return Some(Err(EngineError::Worker {
                                sequence: *next_yield,
                                source: anyhow!(
                                    "timed out after {:?} waiting for batch",
                                    timeout
                                ),
                            }));
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            return Some(Err(EngineError::Worker {
                                sequence: *next_yield,
                                source: anyhow!("all workers exited before the pass completed"),
                            }));
                        }
                    }
                }
            }
        }
    }
}

fn run_worker<D: Dataset>(
    ctx: &PrepareContext<D>,
    task_rx: Receiver<PrefetchTask>,
    output_tx: Sender<(usize, Result<Batch>)>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        match task_rx.recv_timeout(WORKER_POLL) {
            Ok(task) => {
                let result = prepare_batch(ctx, &task.indices).map_err(|source| {
                    EngineError::Worker {
                        sequence: task.sequence,
                        source,
                    }
                });
                // A failed send means the consumer is gone; dropping the
                // result closes its batch arena.
                if output_tx.send((task.sequence, result)).is_err() {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Builds one batch on a fresh child arena. The arena is closed here on any
/// failure; on success the batch takes ownership of it.
fn prepare_batch<D: Dataset>(
    ctx: &PrepareContext<D>,
    indices: &[usize],
) -> anyhow::Result<Batch> {
    let arena = ctx.arena.new_child()?;
    match assemble(ctx, &arena, indices) {
        Ok((data, labels)) => Ok(Batch::new(
            data,
            labels,
            indices.to_vec(),
            ctx.device,
            arena,
        )),
        Err(e) => {
            arena.close();
            Err(e)
        }
    }
}

fn assemble<D: Dataset>(
    ctx: &PrepareContext<D>,
    arena: &Arena,
    indices: &[usize],
) -> anyhow::Result<(TensorList, Option<TensorList>)> {
    let mut data_records = Vec::with_capacity(indices.len());
    let mut label_records = Vec::with_capacity(indices.len());

    for &index in indices {
        let record = ctx
            .dataset
            .get(arena, index)
            .with_context(|| format!("failed to load record {index}"))?;

        let data = match &ctx.pipeline {
            Some(pipeline) => pipeline
                .apply(arena, record.data)
                .with_context(|| format!("pipeline failed on record {index}"))?,
            None => record.data,
        };
        data_records.push(data);

        if let Some(labels) = record.labels {
            let labels = match &ctx.label_pipeline {
                Some(pipeline) => pipeline
                    .apply(arena, labels)
                    .with_context(|| format!("label pipeline failed on record {index}"))?,
                None => labels,
            };
            label_records.push(labels);
        }
    }

    if !label_records.is_empty() && label_records.len() != data_records.len() {
        bail!(
            "{} of {} records carry labels; labels must be all-or-none within a batch",
            label_records.len(),
            data_records.len()
        );
    }

    let data = ctx.batchifier.batchify(arena, &data_records)?;
    let labels = if label_records.is_empty() {
        None
    } else {
        Some(ctx.batchifier.batchify(arena, &label_records)?)
    };
    Ok((data, labels))
}

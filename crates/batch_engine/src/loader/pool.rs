//! Worker pool for parallel batch preparation.
//!
//! A fixed set of threads pulls tasks from a shared bounded channel and
//! pushes results into a bounded output channel. The output bound is what
//! enforces prefetch backpressure: once `prefetch_depth` results sit
//! unconsumed, producers block on `send`.
//!
//! Shutdown is cooperative: dropping the pool raises the shutdown flag,
//! closes the task channel, and joins every worker.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::error::{EngineError, Result};

pub(crate) struct WorkerPool<Task, Output> {
    workers: Vec<thread::JoinHandle<()>>,
    task_tx: Option<Sender<Task>>,
    output_rx: Receiver<Output>,
    shutdown: Arc<AtomicBool>,
}

impl<Task, Output> WorkerPool<Task, Output>
where
    Task: Send + 'static,
    Output: Send + 'static,
{
    /// Spawns `num_workers` threads running `worker_fn`. Both channels are
    /// bounded at `buffer_size`.
    pub(crate) fn new<F>(num_workers: usize, buffer_size: usize, worker_fn: F) -> Result<Self>
    where
        F: Fn(Receiver<Task>, Sender<Output>, Arc<AtomicBool>) + Send + Sync + 'static,
    {
        if num_workers == 0 {
            return Err(EngineError::InvalidConfig(
                "cannot create a worker pool with 0 workers; use inline mode instead".into(),
            ));
        }
        if buffer_size == 0 {
            return Err(EngineError::InvalidConfig(
                "worker pool buffer size must be > 0".into(),
            ));
        }

        let (task_tx, task_rx) = bounded(buffer_size);
        let (output_tx, output_rx) = bounded(buffer_size);
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_fn = Arc::new(worker_fn);
        let mut workers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let task_rx = task_rx.clone();
            let output_tx = output_tx.clone();
            let shutdown_clone = shutdown.clone();
            let worker_fn_clone = worker_fn.clone();

            let handle = thread::Builder::new()
                .name(format!("batch-worker-{}", worker_id))
                .spawn(move || {
                    worker_fn_clone(task_rx, output_tx, shutdown_clone);
                })
                .map_err(EngineError::Spawn)?;
            workers.push(handle);
        }

        Ok(Self {
            workers,
            task_tx: Some(task_tx),
            output_rx,
            shutdown,
        })
    }

    pub(crate) fn send(&self, task: Task) -> bool {
        match &self.task_tx {
            Some(tx) => tx.send(task).is_ok(),
            None => false,
        }
    }

    pub(crate) fn output_rx(&self) -> &Receiver<Output> {
        &self.output_rx
    }
}

impl<Task, Output> Drop for WorkerPool<Task, Output> {
    fn drop(&mut self) {
        // Signal shutdown, close the task channel, then wait for workers.
        self.shutdown.store(true, Ordering::Relaxed);
        self.task_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

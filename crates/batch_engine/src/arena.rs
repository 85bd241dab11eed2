//! Scoped tensor memory: a central pool and a tree of arenas.
//!
//! Every tensor buffer lives in one [`TensorPool`] slot, tagged with a
//! generation counter. An [`Arena`] is a named scope: the set of slots it
//! allocated plus its child arenas. Closing an arena releases everything it
//! transitively owns, so lifetime follows scope structure instead of
//! individual handles.
//!
//! # Rules
//! - Allocation and child creation on a closed arena are rejected
//!   ([`EngineError::ResourceViolation`]).
//! - `close` is idempotent and closes children depth-first before releasing
//!   the arena's own slots.
//! - Reading through a handle whose slot generation has moved on is rejected.
//!
//! The pool tracks opened/closed arena counts and the live tensor count so
//! callers can verify that every scope they opened was torn down.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{EngineError, Result};
use crate::tensor::{Tensor, TensorData};

/// Central allocator for tensor buffers.
///
/// Cloning is cheap; all clones share the same slot table.
#[derive(Clone)]
pub struct TensorPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    slots: Mutex<SlotTable>,
    arenas_opened: AtomicUsize,
    arenas_closed: AtomicUsize,
}

struct SlotTable {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
}

struct Slot {
    generation: u32,
    data: Option<TensorData>,
}

impl TensorPool {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PoolInner {
                slots: Mutex::new(SlotTable {
                    slots: Vec::new(),
                    free: Vec::new(),
                    live: 0,
                }),
                arenas_opened: AtomicUsize::new(0),
                arenas_closed: AtomicUsize::new(0),
            }),
        }
    }

    /// Opens a root arena.
    pub fn new_arena(&self) -> Arena {
        self.inner.arenas_opened.fetch_add(1, Ordering::SeqCst);
        Arena {
            pool: self.clone(),
            state: Arc::new(Mutex::new(ArenaState {
                tensors: Vec::new(),
                children: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Resolves a handle to a copy of its buffer. Stale handles are rejected.
    pub fn read(&self, tensor: Tensor) -> Result<TensorData> {
        let table = self.lock_slots();
        match table.slots.get(tensor.slot as usize) {
            Some(slot) if slot.generation == tensor.generation => match &slot.data {
                Some(data) => Ok(data.clone()),
                None => Err(stale_handle(tensor)),
            },
            _ => Err(stale_handle(tensor)),
        }
    }

    /// Resolves a handle to its shape without copying the buffer.
    pub fn shape(&self, tensor: Tensor) -> Result<Vec<i64>> {
        let table = self.lock_slots();
        match table.slots.get(tensor.slot as usize) {
            Some(slot) if slot.generation == tensor.generation => match &slot.data {
                Some(data) => Ok(data.shape.clone()),
                None => Err(stale_handle(tensor)),
            },
            _ => Err(stale_handle(tensor)),
        }
    }

    /// Number of buffers currently held by open arenas.
    pub fn live_tensors(&self) -> usize {
        self.lock_slots().live
    }

    pub fn arenas_opened(&self) -> usize {
        self.inner.arenas_opened.load(Ordering::SeqCst)
    }

    pub fn arenas_closed(&self) -> usize {
        self.inner.arenas_closed.load(Ordering::SeqCst)
    }

    fn alloc(&self, data: TensorData) -> Tensor {
        let mut table = self.lock_slots();
        table.live += 1;
        if let Some(index) = table.free.pop() {
            let slot = &mut table.slots[index];
            slot.data = Some(data);
            Tensor {
                slot: index as u32,
                generation: slot.generation,
            }
        } else {
            let index = table.slots.len();
            table.slots.push(Slot {
                generation: 0,
                data: Some(data),
            });
            Tensor {
                slot: index as u32,
                generation: 0,
            }
        }
    }

    /// Releases a slot. Tolerant of stale handles so idempotent arena close
    /// never fails.
    fn release(&self, tensor: Tensor) {
        let mut table = self.lock_slots();
        if let Some(slot) = table.slots.get_mut(tensor.slot as usize) {
            if slot.generation == tensor.generation && slot.data.is_some() {
                slot.data = None;
                slot.generation = slot.generation.wrapping_add(1);
                table.free.push(tensor.slot as usize);
                table.live -= 1;
            }
        }
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, SlotTable> {
        // A poisoned lock means another thread panicked mid-operation; the
        // table itself is never left in a torn state by any of our critical
        // sections, so continue with the inner value.
        match self.inner.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for TensorPool {
    fn default() -> Self {
        Self::new()
    }
}

fn stale_handle(tensor: Tensor) -> EngineError {
    EngineError::ResourceViolation(format!(
        "tensor handle slot={} generation={} is no longer live",
        tensor.slot, tensor.generation
    ))
}

/// A scope in the ownership tree. Cloning shares the same scope.
#[derive(Clone)]
pub struct Arena {
    pool: TensorPool,
    state: Arc<Mutex<ArenaState>>,
}

struct ArenaState {
    tensors: Vec<Tensor>,
    children: Vec<Arc<Mutex<ArenaState>>>,
    closed: bool,
}

impl Arena {
    /// Opens a child scope. Closing this arena will close the child first.
    pub fn new_child(&self) -> Result<Arena> {
        let mut state = lock_state(&self.state);
        if state.closed {
            return Err(EngineError::ResourceViolation(
                "cannot open a child of a closed arena".into(),
            ));
        }
        let child = Arc::new(Mutex::new(ArenaState {
            tensors: Vec::new(),
            children: Vec::new(),
            closed: false,
        }));
        state.children.push(child.clone());
        self.pool.inner.arenas_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arena {
            pool: self.pool.clone(),
            state: child,
        })
    }

    /// Allocates a tensor owned by this arena.
    pub fn alloc(&self, shape: Vec<i64>, values: Vec<f32>) -> Result<Tensor> {
        let mut state = lock_state(&self.state);
        if state.closed {
            return Err(EngineError::ResourceViolation(
                "cannot allocate on a closed arena".into(),
            ));
        }
        let tensor = self.pool.alloc(TensorData::new(shape, values));
        state.tensors.push(tensor);
        Ok(tensor)
    }

    /// Resolves a handle to a copy of its buffer.
    pub fn read(&self, tensor: Tensor) -> Result<TensorData> {
        self.pool.read(tensor)
    }

    /// Resolves a handle to its shape.
    pub fn shape(&self, tensor: Tensor) -> Result<Vec<i64>> {
        self.pool.shape(tensor)
    }

    pub fn is_closed(&self) -> bool {
        lock_state(&self.state).closed
    }

    pub fn pool(&self) -> &TensorPool {
        &self.pool
    }

    /// Closes this arena: children depth-first, then its own tensors.
    /// Calling close again is a no-op.
    pub fn close(&self) {
        close_state(&self.pool, &self.state);
    }
}

fn close_state(pool: &TensorPool, state: &Arc<Mutex<ArenaState>>) {
    let (tensors, children) = {
        let mut state = lock_state(state);
        if state.closed {
            return;
        }
        state.closed = true;
        (
            std::mem::take(&mut state.tensors),
            std::mem::take(&mut state.children),
        )
    };
    for child in &children {
        close_state(pool, child);
    }
    for tensor in tensors {
        pool.release(tensor);
    }
    pool.inner.arenas_closed.fetch_add(1, Ordering::SeqCst);
}

fn lock_state(state: &Arc<Mutex<ArenaState>>) -> std::sync::MutexGuard<'_, ArenaState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Closes the wrapped arena when dropped. Used inside the engine so scopes
/// are torn down on every exit path, including early returns on error.
pub(crate) struct ArenaGuard<'a> {
    arena: &'a Arena,
}

impl<'a> ArenaGuard<'a> {
    pub(crate) fn new(arena: &'a Arena) -> Self {
        Self { arena }
    }
}

impl Drop for ArenaGuard<'_> {
    fn drop(&mut self) {
        self.arena.close();
    }
}

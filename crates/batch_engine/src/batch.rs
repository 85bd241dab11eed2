//! The unit of work the loader yields: one batched set of tensors plus the
//! arena that owns them.

use crate::arena::Arena;
use crate::tensor::{Device, TensorList};

/// A prepared batch. Single-use: consume its tensors, then close it.
///
/// The batch owns its arena and closes it on drop, so a batch that is
/// dropped unconsumed (consumer cancelled, channel torn down) releases its
/// tensors without any extra bookkeeping.
pub struct Batch {
    data: TensorList,
    labels: Option<TensorList>,
    indices: Vec<usize>,
    device: Device,
    arena: Arena,
}

impl Batch {
    pub(crate) fn new(
        data: TensorList,
        labels: Option<TensorList>,
        indices: Vec<usize>,
        device: Device,
        arena: Arena,
    ) -> Self {
        Self {
            data,
            labels,
            indices,
            device,
            arena,
        }
    }

    /// The batched input tensors.
    pub fn data(&self) -> &TensorList {
        &self.data
    }

    /// The batched label tensors, when the dataset provides labels.
    pub fn labels(&self) -> Option<&TensorList> {
        self.labels.as_ref()
    }

    /// The dataset indices this batch was assembled from, in batch order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Number of records in the batch.
    pub fn size(&self) -> usize {
        self.indices.len()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// The arena owning this batch's tensors.
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Releases the batch's tensors. Dropping the batch has the same effect.
    pub fn close(self) {
        self.arena.close();
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        self.arena.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::TensorPool;

    #[test]
    fn drop_closes_the_arena() {
        let pool = TensorPool::new();
        let root = pool.new_arena();
        let arena = root.new_child().unwrap();
        let data = vec![arena.alloc(vec![1], vec![1.0]).unwrap()];

        let batch = Batch::new(data, None, vec![0], Device::Cpu, arena);
        assert_eq!(pool.live_tensors(), 1);
        drop(batch);
        assert_eq!(pool.live_tensors(), 0);
        root.close();
    }

    #[test]
    fn explicit_close_matches_drop() {
        let pool = TensorPool::new();
        let root = pool.new_arena();
        let arena = root.new_child().unwrap();
        let data = vec![arena.alloc(vec![2], vec![1.0, 2.0]).unwrap()];

        let batch = Batch::new(data, None, vec![0, 1], Device::Cpu, arena);
        assert_eq!(batch.size(), 2);
        batch.close();
        assert_eq!(pool.live_tensors(), 0);
        root.close();
        assert_eq!(pool.arenas_opened(), pool.arenas_closed());
    }
}

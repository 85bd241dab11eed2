//! Batchifiers merge per-record tensor lists into batched tensors and split
//! them back apart.

use crate::arena::Arena;
use crate::error::{EngineError, Result};
use crate::tensor::TensorList;

/// Defines how N records, each a positional [`TensorList`], become one
/// batched `TensorList` and vice versa.
///
/// `unbatchify(arena, batchify(arena, records), records.len())` must
/// reproduce the records' tensor contents elementwise.
pub trait Batchifier: Send + Sync {
    fn batchify(&self, arena: &Arena, records: &[TensorList]) -> Result<TensorList>;

    fn unbatchify(
        &self,
        arena: &Arena,
        batched: &TensorList,
        count: usize,
    ) -> Result<Vec<TensorList>>;
}

/// Stacks each positional slot along a new leading axis.
///
/// All records must carry the same number of slots, and within a slot every
/// record's tensor must have the same shape. N records with slot shape `S`
/// produce one tensor of shape `[N, S...]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StackBatchifier;

impl Batchifier for StackBatchifier {
    fn batchify(&self, arena: &Arena, records: &[TensorList]) -> Result<TensorList> {
        if records.is_empty() {
            return Err(EngineError::EmptyBatch);
        }

        let slot_count = records[0].len();
        for record in records.iter().skip(1) {
            if record.len() != slot_count {
                return Err(EngineError::SlotCountMismatch {
                    expected: slot_count,
                    found: record.len(),
                });
            }
        }

        let mut batched = Vec::with_capacity(slot_count);
        for slot in 0..slot_count {
            let reference = arena.read(records[0][slot])?;
            let element_count = reference.element_count();
            let mut values = Vec::with_capacity(element_count * records.len());
            values.extend_from_slice(&reference.values);

            for record in records.iter().skip(1) {
                let data = arena.read(record[slot])?;
                if data.shape != reference.shape {
                    return Err(EngineError::ShapeMismatch {
                        slot,
                        expected: reference.shape,
                        found: data.shape,
                    });
                }
                values.extend_from_slice(&data.values);
            }

            let mut shape = Vec::with_capacity(reference.shape.len() + 1);
            shape.push(records.len() as i64);
            shape.extend_from_slice(&reference.shape);
            batched.push(arena.alloc(shape, values)?);
        }
        Ok(batched)
    }

    fn unbatchify(
        &self,
        arena: &Arena,
        batched: &TensorList,
        count: usize,
    ) -> Result<Vec<TensorList>> {
        if count == 0 {
            return Err(EngineError::EmptyBatch);
        }

        let mut records = vec![Vec::with_capacity(batched.len()); count];
        for (slot, &tensor) in batched.iter().enumerate() {
            let data = arena.read(tensor)?;
            if data.shape.first() != Some(&(count as i64)) {
                return Err(EngineError::ShapeMismatch {
                    slot,
                    expected: vec![count as i64],
                    found: data.shape,
                });
            }
            let inner_shape = data.shape[1..].to_vec();
            let stride = data.values.len() / count;
            for (i, record) in records.iter_mut().enumerate() {
                let chunk = data.values[i * stride..(i + 1) * stride].to_vec();
                record.push(arena.alloc(inner_shape.clone(), chunk)?);
            }
        }
        Ok(records)
    }
}

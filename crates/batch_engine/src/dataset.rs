//! Random-access datasets that materialize records into a caller's arena.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::arena::Arena;
use crate::tensor::{TensorData, TensorList};

/// One example: its input tensors plus optional label tensors.
#[derive(Debug, Clone)]
pub struct Record {
    pub data: TensorList,
    pub labels: Option<TensorList>,
}

/// A `Dataset` provides random access to examples by index.
///
/// `get` materializes the record's tensors into the arena it is handed, so
/// the caller controls the record's lifetime. Implementations must be
/// `Send + Sync`, and concurrent `get` calls with distinct arenas must be
/// safe; loader workers fetch in parallel, each into its own batch arena.
pub trait Dataset: Send + Sync {
    /// Loads the record at `index`, allocating its tensors into `arena`.
    fn get(&self, arena: &Arena, index: usize) -> Result<Record>;

    /// Total number of records.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dataset holding all rows in memory behind an `Arc`, so clones share
/// storage and the dataset can be handed to loader workers cheaply.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    rows: Arc<[Row]>,
}

#[derive(Debug)]
struct Row {
    data: Vec<TensorData>,
    labels: Option<Vec<TensorData>>,
}

impl InMemoryDataset {
    /// Creates a dataset of unlabeled rows.
    pub fn new(rows: Vec<Vec<TensorData>>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .map(|data| Row { data, labels: None })
                .collect(),
        }
    }

    /// Creates a labeled dataset. `data` and `labels` must be equally long.
    pub fn with_labels(data: Vec<Vec<TensorData>>, labels: Vec<Vec<TensorData>>) -> Result<Self> {
        if data.len() != labels.len() {
            bail!(
                "label rows ({}) do not match data rows ({})",
                labels.len(),
                data.len()
            );
        }
        Ok(Self {
            rows: data
                .into_iter()
                .zip(labels)
                .map(|(data, labels)| Row {
                    data,
                    labels: Some(labels),
                })
                .collect(),
        })
    }
}

impl Dataset for InMemoryDataset {
    fn get(&self, arena: &Arena, index: usize) -> Result<Record> {
        let Some(row) = self.rows.get(index) else {
            bail!("index {} out of bounds for dataset of size {}", index, self.rows.len());
        };

        let mut data = Vec::with_capacity(row.data.len());
        for tensor in &row.data {
            data.push(arena.alloc(tensor.shape.clone(), tensor.values.clone())?);
        }
        let labels = match &row.labels {
            Some(tensors) => {
                let mut labels = Vec::with_capacity(tensors.len());
                for tensor in tensors {
                    labels.push(arena.alloc(tensor.shape.clone(), tensor.values.clone())?);
                }
                Some(labels)
            }
            None => None,
        };
        Ok(Record { data, labels })
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

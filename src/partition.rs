//! Row partitioning shared by every pass that splits an image across workers.
//!
//! All passes (grayscale, every blend frame, gather/merge) must call [`partition`] or
//! [`Partition::new`]; gathered bytes are placed at the offsets these functions return.

use crate::foundation::core::RowRange;
use crate::foundation::error::{GrayfadeError, GrayfadeResult};

/// Row range owned by worker `worker_index` out of `worker_count`.
///
/// Every worker gets `total_rows / worker_count` rows; the last one also takes the remainder.
pub fn partition(
    total_rows: usize,
    worker_count: usize,
    worker_index: usize,
) -> GrayfadeResult<RowRange> {
    if worker_count == 0 {
        return Err(GrayfadeError::configuration("worker count must be >= 1"));
    }
    if worker_index >= worker_count {
        return Err(GrayfadeError::configuration(format!(
            "worker index {worker_index} out of range for {worker_count} workers"
        )));
    }
    if total_rows < worker_count {
        return Err(GrayfadeError::configuration(format!(
            "image has {total_rows} rows, fewer than {worker_count} workers"
        )));
    }

    let per_worker = total_rows / worker_count;
    let start = worker_index * per_worker;
    let end = if worker_index == worker_count - 1 {
        total_rows
    } else {
        start + per_worker
    };
    RowRange::new(start, end)
}

/// The full set of ranges for one run, indexed by worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    total_rows: usize,
    ranges: Vec<RowRange>,
}

impl Partition {
    pub fn new(total_rows: usize, worker_count: usize) -> GrayfadeResult<Self> {
        let ranges = (0..worker_count)
            .map(|k| partition(total_rows, worker_count, k))
            .collect::<GrayfadeResult<Vec<_>>>()?;
        if ranges.is_empty() {
            return Err(GrayfadeError::configuration("worker count must be >= 1"));
        }
        Ok(Self { total_rows, ranges })
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn worker_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn range(&self, worker_index: usize) -> Option<RowRange> {
        self.ranges.get(worker_index).copied()
    }

    pub fn ranges(&self) -> &[RowRange] {
        &self.ranges
    }
}

use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("Worker pool must contain at least one rank")]
    EmptyPool,

    #[error("Cannot partition an empty sweep")]
    EmptySweep,

    #[error("Rank {rank} is outside the worker pool of size {pool_size}")]
    RankOutOfRange { rank: usize, pool_size: usize },
}

/// The contiguous block of point indices owned by one rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPartition {
    pub rank: usize,
    pub range: Range<usize>,
}

impl WorkerPartition {
    #[inline]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn indices(&self) -> Range<usize> {
        self.range.clone()
    }
}

/// Splits `N` sweep points over a pool of `P` ranks.
///
/// Every rank receives `floor(N / P)` points and the first `N mod P` ranks one extra, so
/// the ranges are contiguous, balanced within one element, and their concatenation in rank
/// order is exactly `0..N`. Ranks beyond `N` (when `P > N`) receive empty ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    points: usize,
    pool_size: usize,
}

impl Partitioner {
    pub fn new(points: usize, pool_size: usize) -> Result<Self, PartitionError> {
        if pool_size == 0 {
            return Err(PartitionError::EmptyPool);
        }
        if points == 0 {
            return Err(PartitionError::EmptySweep);
        }
        Ok(Self { points, pool_size })
    }

    #[inline]
    pub fn points(&self) -> usize {
        self.points
    }

    #[inline]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn partition(&self, rank: usize) -> Result<WorkerPartition, PartitionError> {
        if rank >= self.pool_size {
            return Err(PartitionError::RankOutOfRange {
                rank,
                pool_size: self.pool_size,
            });
        }
        let base = self.points / self.pool_size;
        let extra = self.points % self.pool_size;

        let start = rank * base + rank.min(extra);
        let len = base + usize::from(rank < extra);
        Ok(WorkerPartition {
            rank,
            range: start..start + len,
        })
    }

    /// All partitions in rank order.
    pub fn partitions(&self) -> impl Iterator<Item = WorkerPartition> + '_ {
        (0..self.pool_size).filter_map(|rank| self.partition(rank).ok())
    }
}

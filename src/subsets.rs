//! Division of the measurements into subsets, and the order in which the
//! subsets are visited.

use ndarray::Axis;
use serde::Deserialize;
use thiserror::Error;

use crate::{LorBatch, lor::LorError, operator::Array};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PartitionError {
    #[error("at least one subset is needed")]
    NoSubsets,

    #[error("cannot make {subsets} non-empty subsets out of {elements} elements")]
    TooManySubsets { subsets: usize, elements: usize },

    #[error("subset {0} is empty")]
    EmptySubset(usize),

    #[error("index {index} is out of range for {len} elements")]
    OutOfRange { index: usize, len: usize },

    #[error("index {0} appears more than once")]
    Duplicate(usize),

    #[error("index {0} is not in any subset")]
    Missing(usize),

    #[error("partition covers {expected} elements, but the data has {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("subset stride must be positive")]
    ZeroStride,

    #[error(transparent)]
    Lor(#[from] LorError),
}

/// How consecutive measurements are dealt out to subsets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionStrategy {
    /// Subset `k` gets the `k`th block of consecutive elements
    Contiguous,
    /// Subset `k` gets elements `k, k+K, k+2K, ...`
    Interleaved,
}

/// Assignment of each of `len` elements to exactly one of a number of
/// non-empty subsets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    subsets: Vec<Vec<usize>>,
    len: usize,
}

impl Partition {

    pub fn new(strategy: PartitionStrategy, len: usize, num_subsets: usize) -> Result<Self, PartitionError> {
        if num_subsets == 0 { return Err(PartitionError::NoSubsets) }
        if num_subsets > len {
            return Err(PartitionError::TooManySubsets { subsets: num_subsets, elements: len })
        }
        let subsets = match strategy {
            PartitionStrategy::Interleaved => (0..num_subsets)
                .map(|k| (k..len).step_by(num_subsets).collect())
                .collect(),
            PartitionStrategy::Contiguous => {
                // The first `len % num_subsets` blocks are one element longer
                let (size, extra) = (len / num_subsets, len % num_subsets);
                let mut start = 0;
                (0..num_subsets)
                    .map(|k| {
                        let end = start + size + usize::from(k < extra);
                        let block = (start..end).collect();
                        start = end;
                        block
                    })
                    .collect()
            }
        };
        Ok(Self { subsets, len })
    }

    /// Explicit assignment: every index in `0..len` must appear in exactly one
    /// of the (non-empty) `subsets`.
    pub fn from_indices(len: usize, subsets: Vec<Vec<usize>>) -> Result<Self, PartitionError> {
        if subsets.is_empty() { return Err(PartitionError::NoSubsets) }
        let mut seen = vec![false; len];
        for (k, subset) in subsets.iter().enumerate() {
            if subset.is_empty() { return Err(PartitionError::EmptySubset(k)) }
            for &index in subset {
                match seen.get_mut(index) {
                    None => return Err(PartitionError::OutOfRange { index, len }),
                    Some(true) => return Err(PartitionError::Duplicate(index)),
                    Some(flag) => *flag = true,
                }
            }
        }
        if let Some(index) = seen.iter().position(|&s| !s) {
            return Err(PartitionError::Missing(index))
        }
        Ok(Self { subsets, len })
    }

    pub fn num_subsets(&self) -> usize { self.subsets.len() }

    /// Number of elements being partitioned
    pub fn len(&self) -> usize { self.len }

    // Construction rejects empty subsets
    pub fn is_empty(&self) -> bool { false }

    pub fn subset(&self, k: usize) -> &[usize] { &self.subsets[k] }

    pub fn iter(&self) -> impl Iterator<Item = &[usize]> { self.subsets.iter().map(Vec::as_slice) }

    fn check_len(&self, actual: usize) -> Result<(), PartitionError> {
        if actual == self.len { Ok(()) }
        else { Err(PartitionError::LengthMismatch { expected: self.len, actual }) }
    }

    /// One `LorBatch` per subset, carrying along any TOF information
    pub fn split_lors(&self, lors: &LorBatch) -> Result<Vec<LorBatch>, PartitionError> {
        self.check_len(lors.len())?;
        Ok(self.iter().map(|subset| lors.select(subset)).collect::<Result<_, _>>()?)
    }

    /// Split measurements along their first axis, consistently with `split_lors`
    pub fn split_data(&self, data: &Array) -> Result<Vec<Array>, PartitionError> {
        self.check_len(data.shape().first().copied().unwrap_or(0))?;
        Ok(self.iter().map(|subset| data.select(Axis(0), subset)).collect())
    }
}

/// Order in which the subsets are visited during each pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubsetOrder {
    /// `0, 1, 2, ...`
    Sequential,
    /// `0, s, 2s, ..., 1, 1+s, 1+2s, ...`: with interleaved partitions of
    /// sinogram data this spreads consecutive subsets over different views.
    Interleaved { stride: usize },
    /// Caller-supplied permutation of the subset indices
    Explicit(Vec<usize>),
}

impl SubsetOrder {

    /// The visiting order of `num_subsets` subsets, checked to be a
    /// permutation of `0..num_subsets`.
    pub fn order(&self, num_subsets: usize) -> Result<Vec<usize>, PartitionError> {
        let order: Vec<usize> = match self {
            Self::Sequential => (0..num_subsets).collect(),
            Self::Interleaved { stride: 0 } => return Err(PartitionError::ZeroStride),
            Self::Interleaved { stride } => (0..*stride)
                .flat_map(|start| (start..num_subsets).step_by(*stride))
                .collect(),
            Self::Explicit(order) => order.clone(),
        };
        // Reuse the partition checks: the order must visit each subset exactly once
        Partition::from_indices(num_subsets, vec![order.clone()])?;
        Ok(order)
    }
}

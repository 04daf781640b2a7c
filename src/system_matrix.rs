//! Calculation of system matrix elements for use in forward and backward
//! projections.
//!
//! The system matrix is never stored: only the row belonging to the LOR
//! currently being projected exists at any time. Forward and back projections
//! of a LOR read exactly the same row, which is what makes them adjoint to
//! each other.

use crate::{
    Index1_u, LorBatch,
    fov::FOV,
    projector::ProjectorError,
};
use units::todo::Weightf32;

// ----- The trait --------------------------------------------------------------------

/// Interface for calculation of system matrix rows
pub trait SystemMatrix: Sync {

    /// The FOV whose voxels are the columns of the matrix
    fn fov(&self) -> FOV;

    /// Number of measurement bins (matrix rows) contributed by each LOR
    fn bins_per_lor(&self) -> usize { 1 }

    /// Reject LOR batches which lack information this system matrix needs.
    /// Called once per batch, before any projection starts.
    fn check_lors(&self, _lors: &LorBatch) -> Result<(), ProjectorError> { Ok(()) }

    /// Calculate the coupling between the voxels of the FOV and measurement
    /// bin `bin` of LOR number `lor` in `lors`. Place the results in the
    /// output parameter `system_matrix_row`, discarding its previous contents.
    fn update_system_matrix_row(
        &self,
        system_matrix_row: &mut SystemMatrixRow,
        lors: &LorBatch,
        lor: usize,
        bin: usize,
    );

    // Sparse storage of the slice through the system matrix which corresponds
    // to the current LOR. Allocating these anew for each LOR had a noticeable
    // runtime cost, so we create them up-front and reuse them.
    fn buffers(&self) -> SystemMatrixRow { SystemMatrixRow::default() }
}

// ----- Storage of system matrix elements. Only one row is relevant at any single time ------
pub type SystemMatrixElement = (Index1_u, Weightf32);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SystemMatrixRow(pub Vec<SystemMatrixElement>);

impl SystemMatrixRow {
    pub fn with_capacity(n: usize) -> Self { Self(Vec::with_capacity(n)) }
    pub fn iter(&self) -> std::slice::Iter<SystemMatrixElement> { self.0.iter() }
    pub fn clear(&mut self) { self.0.clear(); }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    #[inline]
    pub fn push(&mut self, index: Index1_u, weight: Weightf32) { self.0.push((index, weight)) }

    /// Sum of the weights: the length of the LOR inside the FOV, for non-TOF rows
    pub fn total_weight(&self) -> Weightf32 { self.0.iter().map(|(_, w)| w).sum() }
}

impl IntoIterator for SystemMatrixRow {
    type Item = SystemMatrixElement;
    type IntoIter = std::vec::IntoIter<Self::Item>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a SystemMatrixRow {
    type Item = SystemMatrixElement;
    type IntoIter = std::iter::Cloned<std::slice::Iter<'a, Self::Item>>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().cloned()
    }
}

impl FromIterator<SystemMatrixElement> for SystemMatrixRow {
    fn from_iter<I: IntoIterator<Item = SystemMatrixElement>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Sum product of the row's weights and the corresponding voxel values
#[inline]
pub fn forward_project(system_matrix_row: &SystemMatrixRow, image: &[f32]) -> f32 {
    let mut projection = 0.0;
    for (j, w) in system_matrix_row {
        projection += w * image[j]
    }
    projection
}

/// Distribute `value` over the row's voxels, in proportion to their weights
#[inline]
pub fn back_project(backprojection: &mut [f32], system_matrix_row: &SystemMatrixRow, value: f32) {
    for (j, w) in system_matrix_row {
        backprojection[j] += w * value;
    }
}

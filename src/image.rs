use ndarray::{ArrayD, IxDyn};

use crate::index::{index3_to_1, Index1_u, Index3_u};
use crate::fov::FOV;
use units::todo::Intensityf32;

pub type ImageData = Vec<Intensityf32>;

/// Voxel values together with the geometry they live in.
///
/// The data are stored flat, in the C order described in `crate::index`.
#[derive(Clone, Debug)]
pub struct Image {
    pub fov: FOV,
    pub data: ImageData,
}

impl Image {

    pub fn new(fov: FOV, data: ImageData) -> Self {
        if data.len() != fov.n_voxels() {
            panic!("Image data ({} voxels) does not match dimensions {:?}", data.len(), fov.n());
        };
        Image { fov, data }
    }

    /// A new empty data store with matching size
    pub fn zeros_buffer(fov: FOV) -> ImageData { vec![0.0; fov.n_voxels()] }

    /// Image whose voxel values are `f(voxel index)`
    pub fn from_fn(fov: FOV, f: impl Fn(Index3_u) -> Intensityf32) -> Self {
        let [n0, n1, n2] = fov.n();
        let mut data = Vec::with_capacity(fov.n_voxels());
        for i0 in 0..n0 { for i1 in 0..n1 { for i2 in 0..n2 {
            data.push(f([i0, i1, i2]));
        }}}
        Self { fov, data }
    }

    /// View the voxel values as an array of shape `fov.n()`, as consumed by
    /// the linear operators.
    pub fn to_array(&self) -> ArrayD<Intensityf32> {
        ArrayD::from_shape_vec(IxDyn(&self.fov.n()), self.data.clone())
            .unwrap_or_else(|e| panic!("Image invariant violated: {e}"))
    }

    pub fn from_array(fov: FOV, array: &ArrayD<Intensityf32>) -> Self {
        if array.shape() != fov.n() {
            panic!("Array of shape {:?} does not fit in FOV with {:?} voxels", array.shape(), fov.n());
        }
        // Iteration is in logical order regardless of memory layout
        Self::new(fov, array.iter().cloned().collect())
    }

}

impl core::ops::IndexMut<Index1_u> for Image {
    #[inline]
    fn index_mut(&mut self, i: Index1_u) -> &mut Self::Output { &mut self.data[i] }
}

impl core::ops::Index<Index1_u> for Image {
    type Output = Intensityf32;
    #[inline]
    fn index(&self, i: Index1_u) -> &Self::Output { &self.data[i] }
}

impl core::ops::IndexMut<Index3_u> for Image {
    fn index_mut(&mut self, i3: Index3_u) -> &mut Self::Output {
        let i1 = index3_to_1(i3, self.fov.n());
        &mut self.data[i1]
    }
}

impl core::ops::Index<Index3_u> for Image {
    type Output = Intensityf32;
    fn index(&self, i3: Index3_u) -> &Self::Output {
        let i1 = index3_to_1(i3, self.fov.n());
        &self.data[i1]
    }
}

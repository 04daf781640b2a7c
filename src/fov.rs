//! The size, granularity and position of the Field of View (FOV) in which
//! images are reconstructed.
//!
//! `origin` is the world position of the *centre* of voxel `[0,0,0]`. All
//! three properties are fixed at construction: every operator which refers to
//! an image must agree on them, so they are only exposed through getters.

use thiserror::Error;

use crate::types::{Point, Vector};
use crate::index::{BoxDim_u, Index3_u, Index1_u, index1_to_3};
use units::todo::Lengthf32;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("voxel size must be positive in every dimension, got {0:?}")]
    NonPositiveVoxelSize([Lengthf32; 3]),

    #[error("number of voxels must be non-zero in every dimension, got {0:?}")]
    NoVoxels(BoxDim_u),

    #[error("image origin must be finite, got {0:?}")]
    NonFiniteOrigin([Lengthf32; 3]),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FOV {
    n: BoxDim_u,
    voxel_size: Vector,
    origin: Point,
}

impl FOV {

    pub fn new(n: BoxDim_u, voxel_size: [Lengthf32; 3], origin: [Lengthf32; 3]) -> Result<Self, GeometryError> {
        if n.iter().any(|&n| n == 0) { return Err(GeometryError::NoVoxels(n)) }
        // Written so that NaN is rejected too
        if !voxel_size.iter().all(|&s| s > 0.0 && s.is_finite()) {
            return Err(GeometryError::NonPositiveVoxelSize(voxel_size))
        }
        if !origin.iter().all(|o| o.is_finite()) {
            return Err(GeometryError::NonFiniteOrigin(origin))
        }
        Ok(Self { n, voxel_size: voxel_size.into(), origin: origin.into() })
    }

    /// FOV whose centre coincides with the world origin
    pub fn centred(n: BoxDim_u, voxel_size: [Lengthf32; 3]) -> Result<Self, GeometryError> {
        let origin = [0, 1, 2].map(|d| -0.5 * (n[d] as Lengthf32 - 1.0) * voxel_size[d]);
        Self::new(n, voxel_size, origin)
    }

    pub fn n         (&self) -> BoxDim_u { self.n }
    pub fn voxel_size(&self) -> Vector   { self.voxel_size }
    pub fn origin    (&self) -> Point    { self.origin }

    pub fn n_voxels(&self) -> usize { self.n.iter().product() }

    /// Shape of images living in this FOV, as used by `ndarray`
    pub fn shape(&self) -> Vec<usize> { self.n.to_vec() }

    /// Corner of the FOV with the lowest coordinates (a voxel boundary, not a
    /// voxel centre)
    pub fn lower_corner(&self) -> Point { self.origin - self.voxel_size / 2.0 }

    /// Corner of the FOV with the highest coordinates
    pub fn upper_corner(&self) -> Point {
        let n = Vector::new(self.n[0] as Lengthf32, self.n[1] as Lengthf32, self.n[2] as Lengthf32);
        self.lower_corner() + n.component_mul(&self.voxel_size)
    }

    /// Find centre of voxel with given 3D index
    pub fn voxel_centre(&self, i: Index3_u) -> Point {
        let i = Vector::new(i[0] as Lengthf32, i[1] as Lengthf32, i[2] as Lengthf32);
        self.origin + i.component_mul(&self.voxel_size)
    }

    /// Find centre of voxel with given 1D index
    pub fn voxel_centre1(&self, i: Index1_u) -> Point {
        self.voxel_centre(index1_to_3(i, self.n))
    }

    /// Parametric range `[t_in, t_out]` (with `0` at `p1` and `1` at `p2`) of
    /// the part of the segment `p1 -> p2` which lies inside the FOV.
    ///
    /// Slab method: intersect the parameter intervals in which the segment lies
    /// between each pair of opposite faces. `None` if the segment misses the
    /// FOV, grazes it, or is degenerate.
    pub fn clip(&self, p1: Point, p2: Point) -> Option<(Lengthf32, Lengthf32)> {
        let d = p2 - p1;
        if d.norm_squared() == 0.0 { return None }
        let (lo, hi) = (self.lower_corner(), self.upper_corner());
        let mut t_in : Lengthf32 = 0.0;
        let mut t_out: Lengthf32 = 1.0;
        for dim in 0..3 {
            if d[dim] == 0.0 {
                // Parallel to this pair of faces: either always between them or never
                if p1[dim] <= lo[dim] || p1[dim] >= hi[dim] { return None }
            } else {
                let a = (lo[dim] - p1[dim]) / d[dim];
                let b = (hi[dim] - p1[dim]) / d[dim];
                t_in  = t_in .max(a.min(b));
                t_out = t_out.min(a.max(b));
            }
        }
        if t_in < t_out { Some((t_in, t_out)) } else { None }
    }
}

use nalgebra as na;

use units::todo::Lengthf32;

pub type Vector = na::Vector3<Lengthf32>;
pub type Point  = na::Point3 <Lengthf32>;

/// Cartesian axis with the largest absolute component
#[inline]
pub fn dominant_axis(v: &Vector) -> usize {
    v.iamax()
}

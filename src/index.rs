//! Conversion between 1d and 3d voxel indices.
//!
//! Images are stored in C order: the last axis varies fastest. This is the
//! layout of a standard `ndarray` of shape `[n0, n1, n2]`, so flat image
//! buffers and `ArrayD`s can be handed back and forth without reordering.

use std::ops::{Add, Div, Mul, Rem};

#[allow(non_camel_case_types)] pub type Index1_u = usize;
#[allow(non_camel_case_types)] pub type Index3_u = [usize; 3];
#[allow(non_camel_case_types)] pub type BoxDim_u = [usize; 3];

#[inline]
pub fn index3_to_1<T>([i0, i1, i2]: [T; 3], [_n0, n1, n2]: [T; 3]) -> T
where
    T: Mul<Output = T> + Add<Output = T>
{
    (i0 * n1 + i1) * n2 + i2
}

#[allow(clippy::many_single_char_names)]
pub fn index1_to_3<T>(i: T, [_n0, n1, n2]: [T; 3]) -> [T; 3]
where
    T: Mul<Output = T> +
    Div<Output = T> +
    Rem<Output = T> +
    Copy
{
    let plane = n1 * n2;
    let i0 = i / plane;
    let r  = i % plane;
    let i1 = r / n2;
    let i2 = r % n2;
    [i0, i1, i2]
}

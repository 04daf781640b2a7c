//! Separable Gaussian smoothing, as used to model the finite spatial
//! resolution of the scanner.
//!
//! Each axis is convolved with a normalized 1D kernel, truncated at 4 sigma.
//! Values beyond the edges of the array are taken to be zero, in both the
//! forward and the adjoint direction. As the kernels are symmetric, the
//! filter is self-adjoint.

use ndarray::{Axis, Zip};

use super::{Array, LinearOperator, OperatorError};

/// Kernels extend this many sigmas either side of their centre
const TRUNCATE: f32 = 4.0;

#[derive(Clone, Debug, PartialEq)]
pub struct GaussianFilter {
    shape: Vec<usize>,
    sigmas: Vec<f32>,
    /// `None` on axes which are not smoothed
    kernels: Vec<Option<Vec<f32>>>,
}

impl GaussianFilter {

    /// `sigma` is measured in voxels; give either one value for all axes, or
    /// one value per axis. A sigma of 0 leaves its axis untouched.
    pub fn new(shape: &[usize], sigma: &[f32]) -> Result<Self, OperatorError> {
        let sigmas = match sigma.len() {
            1 => vec![sigma[0]; shape.len()],
            n if n == shape.len() => sigma.to_vec(),
            n => return Err(OperatorError::ShapeMismatch {
                what: "Gaussian sigmas", expected: vec![shape.len()], actual: vec![n],
            }),
        };
        if let Some(&bad) = sigmas.iter().find(|s| !(s.is_finite() && **s >= 0.0)) {
            return Err(OperatorError::InvalidParameter { what: "Gaussian sigma", value: bad })
        }
        let kernels = sigmas.iter().map(|&s| kernel(s)).collect();
        Ok(Self { shape: shape.to_vec(), sigmas, kernels })
    }

    pub fn sigmas(&self) -> &[f32] { &self.sigmas }

    fn smooth(&self, x: &Array) -> Array {
        let mut result = x.to_owned();
        for (axis, kernel) in self.kernels.iter().enumerate() {
            if let Some(kernel) = kernel {
                result = convolve_axis(&result, Axis(axis), kernel);
            }
        }
        result
    }
}

/// Normalized Gaussian, sampled at integer offsets from its centre
fn kernel(sigma: f32) -> Option<Vec<f32>> {
    if sigma == 0.0 { return None }
    let radius = (TRUNCATE * sigma + 0.5) as i32;
    let unnormalized: Vec<f32> = (-radius..=radius)
        .map(|i| (-0.5 * (i as f32 / sigma).powi(2)).exp())
        .collect();
    let total: f32 = unnormalized.iter().sum();
    Some(unnormalized.into_iter().map(|k| k / total).collect())
}

/// Convolve every lane of `x` along `axis` with the symmetric `kernel`
fn convolve_axis(x: &Array, axis: Axis, kernel: &[f32]) -> Array {
    let radius = kernel.len() / 2;
    let mut out = Array::zeros(x.raw_dim());
    Zip::from(out.lanes_mut(axis))
        .and(x.lanes(axis))
        .par_for_each(|mut out, input| {
            let n = input.len();
            for (j, out) in out.iter_mut().enumerate() {
                let first = j.saturating_sub(radius);
                let last  = (j + radius).min(n - 1);
                *out = (first..=last)
                    .map(|m| kernel[radius + m - j] * input[m])
                    .sum();
            }
        });
    out
}

impl LinearOperator for GaussianFilter {
    fn input_shape (&self) -> &[usize] { &self.shape }
    fn output_shape(&self) -> &[usize] { &self.shape }

    fn apply(&self, x: &Array) -> Result<Array, OperatorError> { Ok(self.smooth(x)) }

    fn apply_adjoint(&self, y: &Array) -> Result<Array, OperatorError> { Ok(self.smooth(y)) }
}

//! Linear operators on `ndarray` arrays, and ways of combining them.
//!
//! Every operator maps arrays of a fixed `input_shape` to arrays of a fixed
//! `output_shape`, and knows how to apply its adjoint. Implementors provide
//! the unchecked `apply` and `apply_adjoint`; callers use `forward` and
//! `adjoint`, which verify shapes first.

pub mod composite;
pub mod elementwise;
pub mod gaussian;
pub mod matrix;
pub mod projector;
pub mod subset;
pub mod vstack;

pub use composite::Composite;
pub use elementwise::ElementwiseMultiplication;
pub use gaussian::GaussianFilter;
pub use matrix::{Matrix, SparseMatrix};
pub use projector::JosephProjector;
pub use subset::SubsetOperator;
pub use vstack::Vstack;

use std::borrow::Cow;

use ndarray::{ArrayD, IxDyn};
use rand::{Rng, RngCore};
use thiserror::Error;

use crate::projector::ProjectorError;

pub type Array = ArrayD<f32>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperatorError {
    #[error("{what}: expected shape {expected:?}, got {actual:?}")]
    ShapeMismatch { what: &'static str, expected: Vec<usize>, actual: Vec<usize> },

    #[error("operator {position} produces shape {output:?}, but the operator before it expects {input:?}")]
    ChainMismatch { position: usize, output: Vec<usize>, input: Vec<usize> },

    #[error("{0} needs at least one operator")]
    Empty(&'static str),

    #[error("adjoint mismatch: relative difference {ratio:e} is not below {tolerance:e}")]
    AdjointMismatch { ratio: f64, tolerance: f64 },

    #[error("subset {index} requested, but there are only {count}")]
    SubsetIndex { index: usize, count: usize },

    #[error("invalid {what}: {value}")]
    InvalidParameter { what: &'static str, value: f32 },

    #[error("row {row} refers to column {column}, but the matrix has {columns} columns")]
    ColumnOutOfRange { row: usize, column: usize, columns: usize },

    #[error(transparent)]
    Projector(#[from] ProjectorError),
}

pub trait LinearOperator: Send + Sync {

    fn input_shape(&self) -> &[usize];

    fn output_shape(&self) -> &[usize];

    /// `A x`, assuming `x` has `input_shape`
    fn apply(&self, x: &Array) -> Result<Array, OperatorError>;

    /// `A^T y`, assuming `y` has `output_shape`
    fn apply_adjoint(&self, y: &Array) -> Result<Array, OperatorError>;

    fn input_size (&self) -> usize { self.input_shape ().iter().product() }
    fn output_size(&self) -> usize { self.output_shape().iter().product() }

    /// `A x`. No broadcasting: `x` must have exactly `input_shape`.
    fn forward(&self, x: &Array) -> Result<Array, OperatorError> {
        check_shape("operator input", self.input_shape(), x.shape())?;
        self.apply(x)
    }

    /// `A^T y`. No broadcasting: `y` must have exactly `output_shape`.
    fn adjoint(&self, y: &Array) -> Result<Array, OperatorError> {
        check_shape("adjoint input", self.output_shape(), y.shape())?;
        self.apply_adjoint(y)
    }

    /// Check `<A x, y> == <x, A^T y>` for random `x` and `y` drawn from `rng`.
    ///
    /// Returns the relative difference `|<Ax,y> - <x,A^T y>| / max(1, |<Ax,y>|)`
    /// if it is below `tolerance`.
    fn adjointness_test(&self, rng: &mut dyn RngCore, tolerance: f64) -> Result<f64, OperatorError> {
        let x = random_array(rng, self.input_shape());
        let y = random_array(rng, self.output_shape());
        let ax_y  = vdot(&self.forward(&x)?, &y);
        let x_aty = vdot(&x, &self.adjoint(&y)?);
        let ratio = (ax_y - x_aty).abs() / ax_y.abs().max(1.0);
        if ratio < tolerance { Ok(ratio) }
        else { Err(OperatorError::AdjointMismatch { ratio, tolerance }) }
    }

    /// Estimate of the largest singular value, by `iterations` rounds of
    /// power iteration on `A^T A`, starting from a random image.
    fn norm(&self, rng: &mut dyn RngCore, iterations: usize) -> Result<f32, OperatorError> {
        let mut x = random_array(rng, self.input_shape());
        let mut estimate = 0.0;
        for _ in 0..iterations.max(1) {
            let length = vdot(&x, &x).sqrt();
            if length == 0.0 { return Ok(0.0) }
            x.mapv_inplace(|v| (v as f64 / length) as f32);
            x = self.adjoint(&self.forward(&x)?)?;
            estimate = vdot(&x, &x).sqrt().sqrt();
        }
        Ok(estimate as f32)
    }
}

pub(crate) fn check_shape(what: &'static str, expected: &[usize], actual: &[usize]) -> Result<(), OperatorError> {
    if expected == actual { Ok(()) }
    else { Err(OperatorError::ShapeMismatch { what, expected: expected.to_vec(), actual: actual.to_vec() }) }
}

/// Array of `shape` holding `data`, in C order
pub(crate) fn shaped(shape: &[usize], data: Vec<f32>) -> Result<Array, OperatorError> {
    let actual = vec![data.len()];
    ArrayD::from_shape_vec(IxDyn(shape), data)
        .map_err(|_| OperatorError::ShapeMismatch { what: "flat data", expected: shape.to_vec(), actual })
}

/// Elements of `x` in C order, without copying when `x` is already contiguous
pub(crate) fn flat(x: &Array) -> Cow<'_, [f32]> {
    match x.as_slice() {
        Some(slice) => Cow::Borrowed(slice),
        None => Cow::Owned(x.iter().copied().collect()),
    }
}

/// Inner product, accumulated in `f64`
pub fn vdot(a: &Array, b: &Array) -> f64 {
    a.iter().zip(b.iter()).map(|(&a, &b)| a as f64 * b as f64).sum()
}

fn random_array(rng: &mut dyn RngCore, shape: &[usize]) -> Array {
    ArrayD::from_shape_simple_fn(IxDyn(shape), || rng.gen::<f32>())
}

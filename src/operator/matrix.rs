//! Explicit matrices as operators: dense `ndarray` matrices for small
//! problems, and sparse rows of `(column, value)` pairs for anything bigger.

use ndarray::{Array1, Array2};
use rayon::prelude::*;

use crate::system_matrix::{SystemMatrixRow, back_project, forward_project};

use super::{Array, LinearOperator, OperatorError, flat, shaped};

/// Dense matrix acting on 1-dimensional arrays
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    matrix: Array2<f32>,
    input_shape: [usize; 1],
    output_shape: [usize; 1],
}

impl Matrix {
    pub fn new(matrix: Array2<f32>) -> Self {
        let (rows, cols) = matrix.dim();
        Self { matrix, input_shape: [cols], output_shape: [rows] }
    }

    pub fn matrix(&self) -> &Array2<f32> { &self.matrix }
}

impl LinearOperator for Matrix {
    fn input_shape (&self) -> &[usize] { &self.input_shape }
    fn output_shape(&self) -> &[usize] { &self.output_shape }

    fn apply(&self, x: &Array) -> Result<Array, OperatorError> {
        let x = Array1::from(flat(x).into_owned());
        Ok(self.matrix.dot(&x).into_dyn())
    }

    fn apply_adjoint(&self, y: &Array) -> Result<Array, OperatorError> {
        let y = Array1::from(flat(y).into_owned());
        Ok(self.matrix.t().dot(&y).into_dyn())
    }
}

/// Sparse matrix stored row by row. The input may have any shape; the
/// columns index its elements in C order.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseMatrix {
    rows: Vec<SystemMatrixRow>,
    input_shape: Vec<usize>,
    output_shape: [usize; 1],
}

impl SparseMatrix {
    pub fn new(input_shape: &[usize], rows: Vec<SystemMatrixRow>) -> Result<Self, OperatorError> {
        let columns: usize = input_shape.iter().product();
        for (row, elements) in rows.iter().enumerate() {
            if let Some((column, _)) = elements.iter().find(|(column, _)| *column >= columns) {
                return Err(OperatorError::ColumnOutOfRange { row, column: *column, columns })
            }
        }
        let output_shape = [rows.len()];
        Ok(Self { rows, input_shape: input_shape.to_vec(), output_shape })
    }

    pub fn rows(&self) -> &[SystemMatrixRow] { &self.rows }
}

impl LinearOperator for SparseMatrix {
    fn input_shape (&self) -> &[usize] { &self.input_shape }
    fn output_shape(&self) -> &[usize] { &self.output_shape }

    fn apply(&self, x: &Array) -> Result<Array, OperatorError> {
        let x = flat(x);
        let y = self.rows.par_iter().map(|row| forward_project(row, &x)).collect();
        shaped(&self.output_shape, y)
    }

    fn apply_adjoint(&self, y: &Array) -> Result<Array, OperatorError> {
        let y = flat(y);
        let columns = self.input_size();
        let x = self.rows
            .par_iter()
            .zip(y.par_iter())
            .fold(|| vec![0.0; columns], |mut x, (row, &value)| {
                back_project(&mut x, row, value);
                x
            })
            .reduce(|| vec![0.0; columns], crate::projector::elementwise_add);
        shaped(&self.input_shape, x)
    }
}

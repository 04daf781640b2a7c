use super::{Array, LinearOperator, OperatorError, Vstack};

/// Operators sharing an input shape, each describing one subset of the
/// measurements, as used by ordered-subsets algorithms.
///
/// As a whole it behaves like the `Vstack` of its subsets; individual subsets
/// can be applied with `apply_subset` and `adjoint_subset`. The subset
/// boundaries are fixed at construction.
pub struct SubsetOperator {
    stack: Vstack,
}

impl SubsetOperator {
    pub fn new(operators: Vec<Box<dyn LinearOperator>>) -> Result<Self, OperatorError> {
        Ok(Self { stack: Vstack::new(operators)? })
    }

    pub fn num_subsets(&self) -> usize { self.stack.len() }

    pub fn subset(&self, k: usize) -> Result<&dyn LinearOperator, OperatorError> {
        self.stack.operators()
            .get(k)
            .map(|op| op.as_ref())
            .ok_or(OperatorError::SubsetIndex { index: k, count: self.num_subsets() })
    }

    pub fn output_shape_of(&self, k: usize) -> Result<&[usize], OperatorError> { Ok(self.subset(k)?.output_shape()) }

    /// `A_k x`
    pub fn apply_subset(&self, x: &Array, k: usize) -> Result<Array, OperatorError> {
        self.subset(k)?.forward(x)
    }

    /// `A_k^T y_k`
    pub fn adjoint_subset(&self, y: &Array, k: usize) -> Result<Array, OperatorError> {
        self.subset(k)?.adjoint(y)
    }

    /// Cut data for the whole operator into per-subset pieces
    pub fn split(&self, y: &Array) -> Result<Vec<Array>, OperatorError> { self.stack.split(y) }
}

impl LinearOperator for SubsetOperator {
    fn input_shape (&self) -> &[usize] { self.stack.input_shape() }
    fn output_shape(&self) -> &[usize] { self.stack.output_shape() }

    fn apply(&self, x: &Array) -> Result<Array, OperatorError> { self.stack.apply(x) }

    fn apply_adjoint(&self, y: &Array) -> Result<Array, OperatorError> { self.stack.apply_adjoint(y) }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::operator::Matrix;
    use ndarray::{array, concatenate, Array1, Axis};

    fn subsets() -> SubsetOperator {
        SubsetOperator::new(vec![
            Box::new(Matrix::new(array![[1.0, 2.0], [-3.0, 2.0]])),
            Box::new(Matrix::new(array![[-1.0, -1.0]])),
        ]).unwrap()
    }

    #[test]
    fn whole_is_concatenation_of_subsets() {
        let op = subsets();
        let x = array![-2.0_f32, 1.0].into_dyn();
        let pieces: Vec<Array1<f32>> = (0..op.num_subsets())
            .map(|k| op.apply_subset(&x, k).unwrap().into_dimensionality().unwrap())
            .collect();
        let views: Vec<_> = pieces.iter().map(|p| p.view()).collect();
        let whole = concatenate(Axis(0), &views).unwrap().into_dyn();
        assert_eq!(op.forward(&x).unwrap(), whole);
    }

    #[test]
    fn whole_adjoint_is_sum_of_subset_adjoints() {
        let op = subsets();
        let y = array![1.0_f32, 1.0, 1.0].into_dyn();
        let pieces = op.split(&y).unwrap();
        let sum = op.adjoint_subset(&pieces[0], 0).unwrap() + op.adjoint_subset(&pieces[1], 1).unwrap();
        assert_eq!(op.adjoint(&y).unwrap(), sum);
        assert_eq!(sum, array![-3.0_f32, 3.0].into_dyn());
    }

    #[test]
    fn bad_subset_index() {
        let op = subsets();
        let x = array![1.0_f32, 1.0].into_dyn();
        assert_eq!(op.apply_subset(&x, 2), Err(OperatorError::SubsetIndex { index: 2, count: 2 }));
        assert_eq!(op.output_shape_of(1).unwrap(), &[1]);
    }
}

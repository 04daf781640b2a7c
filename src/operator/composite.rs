use super::{Array, LinearOperator, OperatorError};

/// Chain of operators, `A ∘ B ∘ C`, built from `[A, B, C]`.
///
/// The forward direction applies the *last* operator first: `A(B(C(x)))`.
/// The adjoint applies the first operator's adjoint first: `C^T(B^T(A^T(y)))`.
pub struct Composite {
    operators: Vec<Box<dyn LinearOperator>>,
}

impl Composite {
    pub fn new(operators: Vec<Box<dyn LinearOperator>>) -> Result<Self, OperatorError> {
        if operators.is_empty() { return Err(OperatorError::Empty("composite")) }
        for (position, pair) in operators.windows(2).enumerate() {
            let (outer, inner) = (&pair[0], &pair[1]);
            if inner.output_shape() != outer.input_shape() {
                return Err(OperatorError::ChainMismatch {
                    position: position + 1,
                    output: inner.output_shape().to_vec(),
                    input : outer.input_shape ().to_vec(),
                })
            }
        }
        Ok(Self { operators })
    }

    pub fn operators(&self) -> &[Box<dyn LinearOperator>] { &self.operators }

    fn innermost(&self) -> &dyn LinearOperator { self.operators[self.operators.len() - 1].as_ref() }
    fn outermost(&self) -> &dyn LinearOperator { self.operators[0].as_ref() }
}

impl LinearOperator for Composite {
    fn input_shape (&self) -> &[usize] { self.innermost().input_shape() }
    fn output_shape(&self) -> &[usize] { self.outermost().output_shape() }

    fn apply(&self, x: &Array) -> Result<Array, OperatorError> {
        let mut operators = self.operators.iter().rev();
        // Construction guarantees at least one operator
        let mut x = match operators.next() {
            Some(first) => first.apply(x)?,
            None => x.clone(),
        };
        for operator in operators {
            x = operator.apply(&x)?;
        }
        Ok(x)
    }

    fn apply_adjoint(&self, y: &Array) -> Result<Array, OperatorError> {
        let mut operators = self.operators.iter();
        let mut y = match operators.next() {
            Some(first) => first.apply_adjoint(y)?,
            None => y.clone(),
        };
        for operator in operators {
            y = operator.apply_adjoint(&y)?;
        }
        Ok(y)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::operator::{ElementwiseMultiplication, GaussianFilter, Matrix};
    use ndarray::{array, Array2};
    use rand_core::SeedableRng;
    use rand_isaac::Isaac64Rng;

    fn boxed(m: Array2<f32>) -> Box<dyn LinearOperator> { Box::new(Matrix::new(m)) }

    #[test]
    fn last_operator_is_applied_first() {
        // Shapes only fit in one order: [2] -> [3] -> [1]
        let a = array![[1.0_f32, 1.0, 1.0]];
        let b = array![[1.0_f32, 0.0], [0.0, 2.0], [3.0, 0.0]];
        let c = Composite::new(vec![boxed(a.clone()), boxed(b.clone())]).unwrap();
        assert_eq!(c.input_shape(), &[2]);
        assert_eq!(c.output_shape(), &[1]);
        let x = array![1.0_f32, 10.0].into_dyn();
        assert_eq!(c.forward(&x).unwrap(), array![24.0_f32].into_dyn());
        assert_eq!(c.adjoint(&array![1.0_f32].into_dyn()).unwrap(), array![4.0_f32, 2.0].into_dyn());
    }

    #[test]
    fn order_matters_for_square_operators() {
        let a = array![[0.0_f32, 1.0], [1.0, 0.0]];
        let b = array![[2.0_f32, 0.0], [0.0, 3.0]];
        let ab = Composite::new(vec![boxed(a.clone()), boxed(b.clone())]).unwrap();
        let x = array![1.0_f32, 1.0].into_dyn();
        assert_eq!(ab.forward(&x).unwrap(), a.dot(&b).dot(&array![1.0_f32, 1.0]).into_dyn());
        assert_eq!(ab.forward(&x).unwrap(), array![3.0_f32, 2.0].into_dyn());
    }

    #[test]
    fn mismatched_chain_is_rejected() {
        let a = array![[1.0_f32, 1.0, 1.0]];
        let b = array![[1.0_f32, 0.0], [0.0, 2.0], [3.0, 0.0]];
        assert!(matches!(Composite::new(vec![boxed(b), boxed(a)]),
                         Err(OperatorError::ChainMismatch { position: 1, .. })));
        assert!(matches!(Composite::new(vec![]), Err(OperatorError::Empty(_))));
    }

    #[test]
    fn adjointness() {
        let mut rng = Isaac64Rng::seed_from_u64(9);
        let shape = [6, 5, 4];
        let weights = ndarray::ArrayD::from_shape_fn(ndarray::IxDyn(&shape), |i| 1.0 + i[0] as f32 / 3.0);
        let c = Composite::new(vec![
            Box::new(GaussianFilter::new(&shape, &[1.0]).unwrap()),
            Box::new(ElementwiseMultiplication::new(weights)),
            Box::new(GaussianFilter::new(&shape, &[0.5, 0.0, 2.0]).unwrap()),
        ]).unwrap();
        for _ in 0..100 {
            c.adjointness_test(&mut rng, 1e-5).unwrap();
        }
    }
}

use std::sync::Arc;

use super::{Array, LinearOperator, OperatorError};

/// Multiplication by a fixed array of the same shape, such as attenuation
/// factors or detector sensitivities. Self-adjoint.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementwiseMultiplication {
    values: Arc<Array>,
}

impl ElementwiseMultiplication {
    pub fn new(values: impl Into<Arc<Array>>) -> Self { Self { values: values.into() } }

    pub fn values(&self) -> &Array { &self.values }
}

impl LinearOperator for ElementwiseMultiplication {
    fn input_shape (&self) -> &[usize] { self.values.shape() }
    fn output_shape(&self) -> &[usize] { self.values.shape() }

    fn apply(&self, x: &Array) -> Result<Array, OperatorError> {
        Ok(x * &*self.values)
    }

    fn apply_adjoint(&self, y: &Array) -> Result<Array, OperatorError> {
        self.apply(y)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::{array, ArrayD, IxDyn};
    use rand_core::SeedableRng;
    use rand_isaac::Isaac64Rng;

    #[test]
    fn multiplies_each_element() {
        let op = ElementwiseMultiplication::new(array![[1.0_f32, 0.5], [0.0, 2.0]].into_dyn());
        let x = array![[4.0_f32, 4.0], [4.0, 4.0]].into_dyn();
        assert_eq!(op.forward(&x).unwrap(), array![[4.0_f32, 2.0], [0.0, 8.0]].into_dyn());
        assert_eq!(op.adjoint(&x).unwrap(), op.forward(&x).unwrap());
    }

    #[test]
    fn adjointness() {
        let mut rng = Isaac64Rng::seed_from_u64(7);
        let values = ArrayD::from_shape_fn(IxDyn(&[3, 4, 5]), |i| (i[0] + 2 * i[1] + 3 * i[2]) as f32 / 10.0);
        let op = ElementwiseMultiplication::new(values);
        for _ in 0..100 {
            op.adjointness_test(&mut rng, 1e-5).unwrap();
        }
    }
}

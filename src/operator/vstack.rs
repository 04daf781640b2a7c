use super::{Array, LinearOperator, OperatorError, check_shape, flat, shaped};

/// Operators sharing an input shape, stacked on top of each other.
///
/// The output is the concatenation of the flattened outputs of all the
/// operators, in order. The adjoint splits its input accordingly and sums
/// the adjoints of the pieces.
pub struct Vstack {
    operators: Vec<Box<dyn LinearOperator>>,
    input_shape: Vec<usize>,
    output_shape: [usize; 1],
    /// Start of each operator's output in the concatenation, plus the total
    offsets: Vec<usize>,
}

impl Vstack {
    pub fn new(operators: Vec<Box<dyn LinearOperator>>) -> Result<Self, OperatorError> {
        let first = operators.first().ok_or(OperatorError::Empty("stack"))?;
        let input_shape = first.input_shape().to_vec();
        for operator in &operators[1..] {
            check_shape("stacked operator input", &input_shape, operator.input_shape())?;
        }
        let offsets: Vec<usize> = std::iter::once(0)
            .chain(operators.iter().scan(0, |end, op| { *end += op.output_size(); Some(*end) }))
            .collect();
        let output_shape = [offsets[operators.len()]];
        Ok(Self { operators, input_shape, output_shape, offsets })
    }

    pub fn len(&self) -> usize { self.operators.len() }

    // Construction guarantees at least one operator
    pub fn is_empty(&self) -> bool { false }

    pub fn operators(&self) -> &[Box<dyn LinearOperator>] { &self.operators }

    /// Cut a stacked output into the pieces belonging to each operator, each
    /// with its operator's output shape.
    pub fn split(&self, y: &Array) -> Result<Vec<Array>, OperatorError> {
        check_shape("stacked data", &self.output_shape, y.shape())?;
        let y = flat(y);
        self.operators.iter().enumerate()
            .map(|(k, op)| shaped(op.output_shape(), y[self.offsets[k]..self.offsets[k + 1]].to_vec()))
            .collect()
    }
}

impl LinearOperator for Vstack {
    fn input_shape (&self) -> &[usize] { &self.input_shape }
    fn output_shape(&self) -> &[usize] { &self.output_shape }

    fn apply(&self, x: &Array) -> Result<Array, OperatorError> {
        let mut stacked = Vec::with_capacity(self.output_shape[0]);
        for operator in &self.operators {
            stacked.extend(operator.apply(x)?.iter());
        }
        shaped(&self.output_shape, stacked)
    }

    fn apply_adjoint(&self, y: &Array) -> Result<Array, OperatorError> {
        let mut sum = Array::zeros(self.input_shape.as_slice());
        for (operator, piece) in self.operators.iter().zip(self.split(y)?) {
            sum += &operator.apply_adjoint(&piece)?;
        }
        Ok(sum)
    }
}

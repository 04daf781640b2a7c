//! Ordered Subsets Expectation Maximization.
//!
//! Each subset update maps the current estimate `x` to
//!
//! ```text
//!            x                 y_k
//!   x <-  -------  A_k^T  -------------
//!          s_k             A_k x + c_k
//! ```
//!
//! where `y_k` and `c_k` are the measured data and the additive contributions
//! (scatter, randoms) of subset `k`, and `s_k = A_k^T 1` is its sensitivity.
//! A pass visits every subset once. MLEM is OSEM with a single subset.

use ndarray::Zip;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    operator::{Array, LinearOperator, OperatorError, SubsetOperator, check_shape},
    subsets::{PartitionError, SubsetOrder},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OsemError {
    #[error(transparent)]
    Operator(#[from] OperatorError),

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error("{what}: expected one array per subset ({expected}), got {actual}")]
    SubsetCount { what: &'static str, expected: usize, actual: usize },

    #[error("{what} of subset {subset} contains invalid value {value}")]
    InvalidData { what: &'static str, subset: usize, value: f32 },

    #[error("subset {subset}: expected counts are not positive in {count} bins with non-zero data")]
    NonPositiveExpectation { subset: usize, count: usize },

    #[error("subset {subset}: update would produce {count} non-finite voxel values")]
    NonFiniteUpdate { subset: usize, count: usize },
}

/// The fixed ingredients of an OSEM reconstruction: subset operator, data
/// and additive contributions, and the precomputed sensitivities.
pub struct Osem<'o> {
    operator: &'o SubsetOperator,
    data: Vec<Array>,
    additive: Vec<Array>,
    sensitivities: Vec<Array>,
}

impl<'o> Osem<'o> {

    /// `data[k]` and `additive[k]` must have the output shape of subset `k`,
    /// and contain only finite, non-negative values.
    pub fn new(operator: &'o SubsetOperator, data: Vec<Array>, additive: Vec<Array>) -> Result<Self, OsemError> {
        let k = operator.num_subsets();
        for (what, arrays) in [("data", &data), ("additive contributions", &additive)] {
            if arrays.len() != k {
                return Err(OsemError::SubsetCount { what, expected: k, actual: arrays.len() })
            }
            for (subset, array) in arrays.iter().enumerate() {
                check_shape(what, operator.output_shape_of(subset)?, array.shape())?;
                if let Some(&value) = array.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
                    return Err(OsemError::InvalidData { what, subset, value })
                }
            }
        }
        let sensitivities = (0..k)
            .map(|subset| {
                let ones = Array::ones(operator.output_shape_of(subset)?);
                operator.adjoint_subset(&ones, subset)
            })
            .collect::<Result<Vec<_>, _>>()?;
        for (subset, sensitivity) in sensitivities.iter().enumerate() {
            let blind = sensitivity.iter().filter(|&&s| s <= 0.0).count();
            if blind > 0 { warn!(subset, blind, "voxels not seen by this subset will be zeroed") }
        }
        debug!(subsets = k, "sensitivities calculated");
        Ok(Self { operator, data, additive, sensitivities })
    }

    pub fn num_subsets(&self) -> usize { self.operator.num_subsets() }

    /// `A_k^T 1`
    pub fn sensitivity(&self, k: usize) -> Option<&Array> { self.sensitivities.get(k) }

    /// Expected data of subset `k`: `A_k x + c_k`
    fn expectation(&self, x: &Array, k: usize) -> Result<Array, OsemError> {
        Ok(self.operator.apply_subset(x, k)? + &self.additive[k])
    }

    /// Update `x` in place, using subset `k`.
    ///
    /// If the expected counts are not positive in some bin where counts were
    /// measured, or if the updated estimate would contain non-finite values
    /// (e.g. from overflowing ratios), the update fails and `x` is left as it
    /// was.
    pub fn update(&self, x: &mut Array, k: usize) -> Result<(), OsemError> {
        // Bad subset indices are reported by the operator
        let ybar = self.expectation(x, k)?;
        let y = &self.data[k];

        let count = Zip::from(y).and(&ybar)
            .fold(0, |n, &y, &ybar| n + usize::from(y > 0.0 && !(ybar > 0.0 && ybar.is_finite())));
        if count > 0 {
            return Err(OsemError::NonPositiveExpectation { subset: k, count })
        }

        // Bins without counts contribute nothing, whatever their expectation
        let ratio = Zip::from(y).and(&ybar)
            .map_collect(|&y, &ybar| if y == 0.0 { 0.0 } else { y / ybar });
        let correction = self.operator.adjoint_subset(&ratio, k)?;

        // Voxels to which this subset is blind, are set to zero
        let updated = Zip::from(&*x).and(&correction).and(&self.sensitivities[k])
            .map_collect(|&x, &c, &s| if s > 0.0 { x * c / s } else { 0.0 });
        let count = updated.iter().filter(|v| !v.is_finite()).count();
        if count > 0 {
            return Err(OsemError::NonFiniteUpdate { subset: k, count })
        }
        x.assign(&updated);
        debug!(subset = k, "OSEM subset update");
        Ok(())
    }

    /// One update per subset, in the given `order`
    pub fn pass(&self, x: &mut Array, order: &[usize]) -> Result<(), OsemError> {
        for &k in order {
            self.update(x, k)?;
        }
        Ok(())
    }

    fn check_start(&self, x0: &Array) -> Result<(), OsemError> {
        check_shape("initial image", self.operator.input_shape(), x0.shape())?;
        if let Some(&value) = x0.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(OsemError::InvalidData { what: "initial image", subset: 0, value })
        }
        Ok(())
    }

    /// Endless sequence of estimates, each one the result of one more pass
    /// over all the subsets, visited in `order`. The sequence stops after
    /// yielding the first error.
    pub fn iterate(&'o self, x0: Array, order: &SubsetOrder) -> Result<impl Iterator<Item = Result<Array, OsemError>> + 'o, OsemError> {
        self.check_start(&x0)?;
        let order = order.order(self.num_subsets())?;
        let mut x = x0;
        let mut pass = 0_usize;
        let mut failed = false;
        Ok(std::iter::from_fn(move || {
            if failed { return None }
            pass += 1;
            match self.pass(&mut x, &order) {
                Ok(()) => {
                    info!(pass, "OSEM pass complete");
                    Some(Ok(x.clone()))
                }
                Err(e) => {
                    failed = true;
                    Some(Err(e))
                }
            }
        }))
    }

    /// Estimate after `iterations` passes over all subsets, visited in `order`
    pub fn run(&self, x0: Array, iterations: usize, order: &SubsetOrder) -> Result<Array, OsemError> {
        self.check_start(&x0)?;
        let order = order.order(self.num_subsets())?;
        let mut x = x0;
        for pass in 1..=iterations {
            self.pass(&mut x, &order)?;
            info!(pass, "OSEM pass complete");
        }
        Ok(x)
    }

    /// Negative Poisson log-likelihood of `x`, summed over all subsets
    pub fn cost(&self, x: &Array) -> Result<f64, OsemError> {
        (0..self.num_subsets())
            .map(|k| -> Result<f64, OsemError> {
                Ok(negative_poisson_log_likelihood(&self.expectation(x, k)?, &self.data[k]))
            })
            .sum()
    }
}

/// `Σ (ybar - y ln ybar)`, taking `0 ln 0 = 0`. Bins with counts but no
/// positive expectation make the result infinite.
pub fn negative_poisson_log_likelihood(ybar: &Array, y: &Array) -> f64 {
    Zip::from(ybar).and(y).fold(0.0, |sum, &ybar, &y| {
        let (ybar, y) = (ybar as f64, y as f64);
        sum + if y == 0.0 { ybar }
              else if ybar <= 0.0 { f64::INFINITY }
              else { ybar - y * ybar.ln() }
    })
}

use std::sync::Arc;

use crate::{
    LorBatch,
    fov::FOV,
    projector::{
        DEFAULT_JOB_SIZE, Joseph, TofBins, TofKernel,
        back_project_lors, forward_project_lors,
    },
    system_matrix::SystemMatrix,
};

use super::{Array, LinearOperator, OperatorError, flat, shaped};

/// Joseph projection of an image onto a fixed batch of LORs.
///
/// Input shape is the FOV's voxel counts. Output shape is `[N]` for `N` LORs,
/// or `[N, num_bins]` in TOF-sinogram mode.
#[derive(Clone, Debug)]
pub struct JosephProjector {
    joseph: Joseph,
    lors: Arc<LorBatch>,
    job_size: usize,
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
}

impl JosephProjector {

    pub fn new(fov: FOV, lors: Arc<LorBatch>) -> Result<Self, OperatorError> {
        Self::build(Joseph::new(fov), lors)
    }

    pub fn with_tof(fov: FOV, lors: Arc<LorBatch>, tof: TofKernel) -> Result<Self, OperatorError> {
        Self::build(Joseph::with_tof(fov, tof), lors)
    }

    fn build(joseph: Joseph, lors: Arc<LorBatch>) -> Result<Self, OperatorError> {
        // Catch missing TOF information now, rather than in the middle of a reconstruction
        joseph.check_lors(&lors)?;
        let input_shape = joseph.fov().shape();
        let output_shape = match joseph.tof().map(|kernel| kernel.bins()) {
            Some(TofBins::Sinogram { num_bins }) => vec![lors.len(), num_bins],
            _ => vec![lors.len()],
        };
        Ok(Self { joseph, lors, job_size: DEFAULT_JOB_SIZE, input_shape, output_shape })
    }

    /// Number of LORs handed to each parallel job
    pub fn with_job_size(self, job_size: usize) -> Self { Self { job_size: job_size.max(1), ..self } }

    pub fn lors(&self) -> &LorBatch { &self.lors }

    pub fn fov(&self) -> FOV { self.joseph.fov() }
}

impl LinearOperator for JosephProjector {
    fn input_shape (&self) -> &[usize] { &self.input_shape }
    fn output_shape(&self) -> &[usize] { &self.output_shape }

    fn apply(&self, x: &Array) -> Result<Array, OperatorError> {
        let projections = forward_project_lors(&self.joseph, &self.lors, &flat(x), self.job_size)?;
        shaped(&self.output_shape, projections)
    }

    fn apply_adjoint(&self, y: &Array) -> Result<Array, OperatorError> {
        let image = back_project_lors(&self.joseph, &self.lors, &flat(y), self.job_size)?;
        shaped(&self.input_shape, image)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{LOR, Point, projector::ProjectorError};
    use float_eq::assert_float_eq;
    use ndarray::{ArrayD, IxDyn};
    use rand::Rng;
    use rand_core::SeedableRng;
    use rand_isaac::Isaac64Rng;

    fn ring(rng: &mut Isaac64Rng, n: usize) -> Arc<LorBatch> {
        let mut point = || {
            let phi = rng.gen::<f32>() * std::f32::consts::TAU;
            Point::new(30.0 * phi.cos(), 30.0 * phi.sin(), rng.gen_range(-8.0..8.0))
        };
        Arc::new(LorBatch::new((0..n).map(|_| LOR::new(point(), point())).collect()).unwrap())
    }

    #[test]
    fn shapes() {
        let mut rng = Isaac64Rng::seed_from_u64(11);
        let fov = FOV::centred([10, 8, 6], [2.0, 2.0, 2.0]).unwrap();
        let lors = ring(&mut rng, 50);
        let op = JosephProjector::new(fov, lors.clone()).unwrap();
        assert_eq!(op.input_shape(), &[10, 8, 6]);
        assert_eq!(op.output_shape(), &[50]);
        let tof = TofKernel::new(3.0, 2.0, 3.0, TofBins::Sinogram { num_bins: 7 }).unwrap();
        let op = JosephProjector::with_tof(fov, lors, tof).unwrap();
        assert_eq!(op.output_shape(), &[50, 7]);
    }

    #[test]
    fn missing_tof_bins_are_caught_at_construction() {
        let mut rng = Isaac64Rng::seed_from_u64(12);
        let fov = FOV::centred([4, 4, 4], [2.0, 2.0, 2.0]).unwrap();
        let tof = TofKernel::new(3.0, 2.0, 3.0, TofBins::Listmode).unwrap();
        assert!(matches!(JosephProjector::with_tof(fov, ring(&mut rng, 5), tof),
                         Err(OperatorError::Projector(ProjectorError::MissingTofBins))));
    }

    #[test]
    fn non_finite_tof_offsets_are_caught_at_construction() {
        let mut rng = Isaac64Rng::seed_from_u64(15);
        let fov = FOV::centred([4, 4, 4], [2.0, 2.0, 2.0]).unwrap();
        let tof = TofKernel::new(3.0, 2.0, 3.0, TofBins::Sinogram { num_bins: 3 }).unwrap();

        // Per-LOR offset
        let lors = ring(&mut rng, 3);
        let lors = Arc::new(LorBatch::clone(&lors).with_tof_offsets(vec![0.0, f32::NAN, 1.0]).unwrap());
        assert!(matches!(JosephProjector::with_tof(fov, lors, tof),
                         Err(OperatorError::Projector(ProjectorError::InvalidLorTof { index: 1, name: "centre offset", .. }))));

        // Kernel-wide offset
        let lors = ring(&mut rng, 3);
        assert!(matches!(JosephProjector::with_tof(fov, lors, tof.with_center_offset(f32::INFINITY)),
                         Err(OperatorError::Projector(ProjectorError::InvalidTof { name: "centre offset", .. }))));
    }

    #[test]
    fn uniform_image_projects_to_lengths_through_fov() {
        let fov = FOV::centred([10, 10, 10], [1.0, 1.0, 1.0]).unwrap();
        let lors = Arc::new(LorBatch::new(vec![
            LOR::new(Point::new(-20.0, 0.5, 0.5), Point::new(20.0, 0.5, 0.5)),
            LOR::new(Point::new(0.5, 0.5, -20.0), Point::new(0.5, 0.5, 20.0)),
        ]).unwrap());
        let op = JosephProjector::new(fov, lors).unwrap();
        let ones = ArrayD::from_elem(IxDyn(&[10, 10, 10]), 1.0);
        let y = op.forward(&ones).unwrap();
        assert_float_eq!(y[[0].as_slice()], 10.0, r2nd <= 1e-6);
        assert_float_eq!(y[[1].as_slice()], 10.0, r2nd <= 1e-6);
    }

    #[test]
    fn adjointness() {
        let mut rng = Isaac64Rng::seed_from_u64(13);
        let fov = FOV::centred([12, 11, 5], [2.0, 2.0, 3.0]).unwrap();
        let op = JosephProjector::new(fov, ring(&mut rng, 400)).unwrap().with_job_size(16);
        for _ in 0..100 {
            op.adjointness_test(&mut rng, 1e-5).unwrap();
        }
    }

    #[test]
    fn tof_sinogram_adjointness() {
        let mut rng = Isaac64Rng::seed_from_u64(14);
        let fov = FOV::centred([8, 8, 4], [2.5, 2.5, 2.5]).unwrap();
        let tof = TofKernel::new(4.0, 3.0, 3.0, TofBins::Sinogram { num_bins: 11 }).unwrap();
        let op = JosephProjector::with_tof(fov, ring(&mut rng, 100), tof).unwrap();
        for _ in 0..100 {
            op.adjointness_test(&mut rng, 1e-5).unwrap();
        }
    }
}

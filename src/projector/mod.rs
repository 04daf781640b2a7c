//! Overall structure of forward and backward projections.
//!
//! The projection driver functions
//!
//! + `forward_project_lors`, which maps an image to one value per measurement
//!   bin of every LOR,
//!
//! + `back_project_lors`, which accumulates one value per measurement bin back
//!   into an image,
//!
//! are abstracted over different algorithms for calculating system matrix
//! elements, via the `SystemMatrix` trait. Both loop over the LORs in parallel.
//! The forward projection of each LOR only reads the image, so its results can
//! be written straight into their slots in the output. The back projections of
//! many LORs hit the same voxels, so each rayon job accumulates into its own
//! image, and these are summed at the end.

pub mod joseph;
pub mod raw;

pub use joseph::{Joseph, TofBins, TofKernel, TofSample};

use rayon::prelude::*;
use thiserror::Error;

use crate::{
    LorBatch,
    fov::GeometryError,
    image::{Image, ImageData},
    lor::LorError,
    system_matrix::{SystemMatrix, SystemMatrixRow, forward_project, back_project},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectorError {
    #[error(transparent)]
    Lor(#[from] LorError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("{what}: expected {expected} values, got {actual}")]
    LengthMismatch { what: &'static str, expected: usize, actual: usize },

    #[error("invalid TOF {name}: {value}")]
    InvalidTof { name: &'static str, value: f32 },

    #[error("invalid TOF {name} for LOR {index}: {value}")]
    InvalidLorTof { index: usize, name: &'static str, value: f32 },

    #[error("listmode TOF projection needs a TOF bin for every LOR")]
    MissingTofBins,
}

/// Number of LORs handed to each rayon job, unless specified otherwise.
///
/// Rayon is too eager in spawning small jobs, each of which requires the
/// construction and subsequent combination of expensive accumulators (whole
/// images) in the back projection.
pub const DEFAULT_JOB_SIZE: usize = 256;

/// Data needed to be passed efficiently between the projection of one LOR and
/// the next. Needs to work in conjunction with `rayon`'s `fold`s.
pub struct FoldState {
    pub backprojection: ImageData,
    pub system_matrix_row: SystemMatrixRow,
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), ProjectorError> {
    if expected == actual { Ok(()) }
    else { Err(ProjectorError::LengthMismatch { what, expected, actual }) }
}

/// Line integrals of `image` along every measurement bin of every LOR in
/// `lors`. The result has `lors.len() * bins_per_lor` elements, LOR-major.
pub fn forward_project_lors<S: SystemMatrix>(
    system_matrix: &S,
    lors         : &LorBatch,
    image        : &[f32],
    job_size     : usize,
) -> Result<Vec<f32>, ProjectorError> {
    check_len("image voxels", system_matrix.fov().n_voxels(), image.len())?;
    system_matrix.check_lors(lors)?;

    let bins = system_matrix.bins_per_lor();
    let mut projections = vec![0.0; lors.len() * bins];
    projections
        .par_chunks_mut(bins)
        .enumerate()
        .with_min_len(job_size.max(1))
        .for_each_init(
            || system_matrix.buffers(),
            |system_matrix_row, (lor, out)| {
                for (bin, out) in out.iter_mut().enumerate() {
                    system_matrix.update_system_matrix_row(system_matrix_row, lors, lor, bin);
                    *out = forward_project(system_matrix_row, image);
                }
            });
    Ok(projections)
}

/// Adjoint of `forward_project_lors`: spread each of `values` back along its
/// LOR and measurement bin, returning the sum over all LORs.
pub fn back_project_lors<S: SystemMatrix>(
    system_matrix: &S,
    lors         : &LorBatch,
    values       : &[f32],
    job_size     : usize,
) -> Result<ImageData, ProjectorError> {
    let bins = system_matrix.bins_per_lor();
    check_len("projection values", lors.len() * bins, values.len())?;
    system_matrix.check_lors(lors)?;
    let fov = system_matrix.fov();

    // Closure preparing the state needed by `fold`: will be called by
    // `fold` at the start of every job that is launched.
    let initial_thread_state = || FoldState {
        backprojection: Image::zeros_buffer(fov),
        system_matrix_row: system_matrix.buffers(),
    };

    // -------- Project all LORs backwards -----------------------------------
    let fold_result = values
        .par_chunks(bins)
        .enumerate()
        .with_min_len(job_size.max(1))
        .fold(initial_thread_state, |mut state, (lor, values)| {
            for (bin, &value) in values.iter().enumerate() {
                // Nothing to spread
                if value == 0.0 { continue }
                system_matrix.update_system_matrix_row(&mut state.system_matrix_row, lors, lor, bin);
                back_project(&mut state.backprojection, &state.system_matrix_row, value);
            }
            state
        });

    // -------- extract relevant information (backprojection) ---------------
    Ok(fold_result
        // Keep only the backprojection (ignore the row buffer)
        .map(|state| state.backprojection)
        // Sum the backprojections calculated in each job
        .reduce(|| Image::zeros_buffer(fov), elementwise_add))
}

pub(crate) fn elementwise_add(mut a: Vec<f32>, b: Vec<f32>) -> Vec<f32> {
    a.iter_mut().zip(b.iter()).for_each(|(l, r)| *l += r);
    a
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{FOV, LOR, Point};
    use float_eq::assert_float_eq;
    use rand::Rng;
    use rand_core::SeedableRng;
    use rand_isaac::Isaac64Rng;

    fn random_lors(rng: &mut Isaac64Rng, n: usize, radius: f32) -> LorBatch {
        let mut point = || {
            let phi: f32 = rng.gen::<f32>() * std::f32::consts::TAU;
            Point::new(radius * phi.cos(), radius * phi.sin(), rng.gen_range(-radius..radius) / 4.0)
        };
        LorBatch::new((0..n).map(|_| LOR::new(point(), point())).collect()).unwrap()
    }

    #[test]
    fn back_projection_is_adjoint_of_forward_projection() {
        let mut rng = Isaac64Rng::seed_from_u64(1);
        let fov = FOV::new([12, 10, 7], [2.0, 2.5, 3.0], [-10.0, -12.0, -8.0]).unwrap();
        let lors = random_lors(&mut rng, 2000, 40.0);
        let joseph = Joseph::new(fov);

        let x: Vec<f32> = (0..fov.n_voxels()).map(|_| rng.gen()).collect();
        let y: Vec<f32> = (0..lors.len()).map(|_| rng.gen()).collect();

        let ax  = forward_project_lors(&joseph, &lors, &x, 64).unwrap();
        let aty = back_project_lors   (&joseph, &lors, &y, 64).unwrap();

        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(&a, &b)| a as f64 * b as f64).sum::<f64>();
        assert_float_eq!(dot(&ax, &y), dot(&x, &aty), r2nd <= 1e-5);
    }

    #[test]
    fn back_projection_does_not_depend_on_job_size() {
        let mut rng = Isaac64Rng::seed_from_u64(2);
        let fov = FOV::centred([9, 9, 9], [2.0, 2.0, 2.0]).unwrap();
        let lors = random_lors(&mut rng, 500, 20.0);
        let y: Vec<f32> = (0..lors.len()).map(|_| rng.gen()).collect();
        let joseph = Joseph::new(fov);
        let one  = back_project_lors(&joseph, &lors, &y,    1).unwrap();
        let many = back_project_lors(&joseph, &lors, &y, 1000).unwrap();
        for (a, b) in one.iter().zip(many.iter()) {
            assert_float_eq!(*a, *b, r2nd <= 1e-5);
        }
    }

    #[test]
    fn lor_outside_fov_projects_to_zero_and_leaves_image_untouched() {
        let fov = FOV::centred([5, 5, 5], [1.0, 1.0, 1.0]).unwrap();
        let lors = LorBatch::new(vec![
            LOR::new(Point::new(-10.0, 7.0, 0.0), Point::new(10.0, 7.0, 0.0)),
            LOR::new(Point::new(  0.2, 0.1, 0.3), Point::new( 0.2, 0.1, 0.3)),
        ]).unwrap();
        let joseph = Joseph::new(fov);
        let image = vec![1.0; fov.n_voxels()];
        assert_eq!(forward_project_lors(&joseph, &lors, &image, 1).unwrap(), vec![0.0, 0.0]);
        let back = back_project_lors(&joseph, &lors, &[3.0, 5.0], 1).unwrap();
        assert!(back.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn mismatched_lengths_are_reported_before_projecting() {
        let fov = FOV::centred([5, 5, 5], [1.0, 1.0, 1.0]).unwrap();
        let lors = LorBatch::new(vec![LOR::new(Point::new(-9.0, 0.0, 0.0), Point::new(9.0, 0.0, 0.0))]).unwrap();
        let joseph = Joseph::new(fov);
        assert!(matches!(forward_project_lors(&joseph, &lors, &[1.0; 124], 1),
                         Err(ProjectorError::LengthMismatch { expected: 125, actual: 124, .. })));
        assert!(matches!(back_project_lors(&joseph, &lors, &[1.0, 2.0], 1),
                         Err(ProjectorError::LengthMismatch { expected: 1, actual: 2, .. })));
    }

    #[test]
    fn listmode_tof_needs_bins() {
        let fov = FOV::centred([5, 5, 5], [1.0, 1.0, 1.0]).unwrap();
        let lors = LorBatch::new(vec![LOR::new(Point::new(-9.0, 0.0, 0.0), Point::new(9.0, 0.0, 0.0))]).unwrap();
        let kernel = TofKernel::new(2.0, 1.0, 3.0, TofBins::Listmode).unwrap();
        let joseph = Joseph::with_tof(fov, kernel);
        let image = vec![1.0; fov.n_voxels()];
        assert_eq!(forward_project_lors(&joseph, &lors, &image, 1), Err(ProjectorError::MissingTofBins));
        let lors = lors.with_tof_bins(vec![0]).unwrap();
        assert!(forward_project_lors(&joseph, &lors, &image, 1).is_ok());
    }
}

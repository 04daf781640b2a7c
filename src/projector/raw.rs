//! Projections over flat arrays.
//!
//! Entry points for callers which keep LOR end points, images and projections
//! in plain contiguous buffers: `[x0, y0, z0, x1, y1, z1, ...]` for points,
//! C-order for images, LOR-major for TOF sinograms. Every length is checked
//! before any work is done. Back projections *accumulate* into the image
//! buffer, so that several batches can be back projected into the same image.

use units::todo::{Lengthf32, Ratiof32};

use crate::{BoxDim_u, LorBatch, fov::FOV};

use super::{
    Joseph, ProjectorError, TofBins, TofKernel,
    back_project_lors, check_len, forward_project_lors,
};

/// Geometry of the image buffer passed to the flat-array projections
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageGeometry {
    /// World coordinates of the centre of voxel `[0,0,0]`
    pub origin: [Lengthf32; 3],
    pub voxel_size: [Lengthf32; 3],
    pub n: BoxDim_u,
}

impl ImageGeometry {
    fn fov(&self) -> Result<FOV, ProjectorError> {
        Ok(FOV::new(self.n, self.voxel_size, self.origin)?)
    }
}

/// TOF parameters of the listmode projections. `sigma` and `center_offset`
/// hold either one value shared by all LORs, or one value per LOR.
#[derive(Clone, Copy, Debug)]
pub struct ListmodeTof<'a> {
    pub bins: &'a [i32],
    pub sigma: &'a [Lengthf32],
    pub center_offset: &'a [Lengthf32],
    pub bin_width: Lengthf32,
    pub num_sigmas: Ratiof32,
}

/// TOF parameters of the sinogram projections. `sigma` and `center_offset`
/// hold either one value shared by all LORs, or one value per LOR.
#[derive(Clone, Copy, Debug)]
pub struct SinogramTof<'a> {
    pub num_bins: usize,
    pub sigma: &'a [Lengthf32],
    pub center_offset: &'a [Lengthf32],
    pub bin_width: Lengthf32,
    pub num_sigmas: Ratiof32,
}

fn number_of_lors(starts: &[Lengthf32], ends: &[Lengthf32]) -> Result<usize, ProjectorError> {
    if starts.len() % 3 != 0 {
        return Err(crate::lor::LorError::NotTriplets(starts.len()).into())
    }
    check_len("LOR end coordinates", starts.len(), ends.len())?;
    Ok(starts.len() / 3)
}

/// Value shared by all LORs, or `None` when there is one value per LOR
fn scalar_or_per_lor(what: &'static str, values: &[Lengthf32], nlors: usize) -> Result<Option<Lengthf32>, ProjectorError> {
    match values.len() {
        1 => Ok(Some(values[0])),
        n if n == nlors => Ok(None),
        n => Err(ProjectorError::LengthMismatch { what, expected: nlors, actual: n }),
    }
}

/// Build the projector and the LOR batch, after checking every length
fn tof_setup(
    starts: &[Lengthf32],
    ends  : &[Lengthf32],
    sigma : &[Lengthf32],
    center_offset: &[Lengthf32],
    bin_width: Lengthf32,
    num_sigmas: Ratiof32,
    bins: TofBins,
) -> Result<(usize, TofKernel, Option<Vec<Lengthf32>>, Option<Vec<Lengthf32>>), ProjectorError> {
    let nlors = number_of_lors(starts, ends)?;
    let shared_sigma  = scalar_or_per_lor("TOF sigmas"        , sigma        , nlors)?;
    let shared_offset = scalar_or_per_lor("TOF centre offsets", center_offset, nlors)?;
    let kernel = TofKernel::new(shared_sigma.or(sigma.first().copied()).unwrap_or(0.0), bin_width, num_sigmas, bins)?
        .with_center_offset(shared_offset.unwrap_or(0.0));
    let per_lor_sigma  = shared_sigma .is_none().then(|| sigma        .to_vec());
    let per_lor_offset = shared_offset.is_none().then(|| center_offset.to_vec());
    Ok((nlors, kernel, per_lor_sigma, per_lor_offset))
}

fn batch(
    starts: &[Lengthf32],
    ends  : &[Lengthf32],
    sigma : Option<Vec<Lengthf32>>,
    offset: Option<Vec<Lengthf32>>,
) -> Result<LorBatch, ProjectorError> {
    let mut lors = LorBatch::from_flat(starts, ends)?;
    if let Some(sigma)  = sigma  { lors = lors.with_tof_sigmas (sigma)?  }
    if let Some(offset) = offset { lors = lors.with_tof_offsets(offset)? }
    Ok(lors)
}

/// Non-TOF forward projection of `image` along each LOR, into `projections`
pub fn joseph3d_fwd(
    starts     : &[Lengthf32],
    ends       : &[Lengthf32],
    image      : &[f32],
    geometry   : ImageGeometry,
    projections: &mut [f32],
    job_size   : usize,
) -> Result<(), ProjectorError> {
    let nlors = number_of_lors(starts, ends)?;
    let fov = geometry.fov()?;
    check_len("image voxels", fov.n_voxels(), image.len())?;
    check_len("projections", nlors, projections.len())?;
    if nlors == 0 { return Ok(()) }
    let lors = LorBatch::from_flat(starts, ends)?;
    let result = forward_project_lors(&Joseph::new(fov), &lors, image, job_size)?;
    projections.copy_from_slice(&result);
    Ok(())
}

/// Non-TOF back projection of `projections` along each LOR, added to `image`
pub fn joseph3d_back(
    starts     : &[Lengthf32],
    ends       : &[Lengthf32],
    image      : &mut [f32],
    geometry   : ImageGeometry,
    projections: &[f32],
    job_size   : usize,
) -> Result<(), ProjectorError> {
    let nlors = number_of_lors(starts, ends)?;
    let fov = geometry.fov()?;
    check_len("image voxels", fov.n_voxels(), image.len())?;
    check_len("projections", nlors, projections.len())?;
    if nlors == 0 { return Ok(()) }
    let lors = LorBatch::from_flat(starts, ends)?;
    let back = back_project_lors(&Joseph::new(fov), &lors, projections, job_size)?;
    image.iter_mut().zip(back).for_each(|(i, b)| *i += b);
    Ok(())
}

/// Listmode TOF forward projection: one value per LOR, in its own TOF bin
pub fn joseph3d_fwd_tof_lm(
    starts     : &[Lengthf32],
    ends       : &[Lengthf32],
    image      : &[f32],
    geometry   : ImageGeometry,
    tof        : ListmodeTof,
    projections: &mut [f32],
    job_size   : usize,
) -> Result<(), ProjectorError> {
    let (nlors, kernel, sigma, offset) = tof_setup(
        starts, ends, tof.sigma, tof.center_offset, tof.bin_width, tof.num_sigmas, TofBins::Listmode)?;
    let fov = geometry.fov()?;
    check_len("image voxels", fov.n_voxels(), image.len())?;
    check_len("TOF bins", nlors, tof.bins.len())?;
    check_len("projections", nlors, projections.len())?;
    if nlors == 0 { return Ok(()) }
    let lors = batch(starts, ends, sigma, offset)?.with_tof_bins(tof.bins.to_vec())?;
    let result = forward_project_lors(&Joseph::with_tof(fov, kernel), &lors, image, job_size)?;
    projections.copy_from_slice(&result);
    Ok(())
}

/// Adjoint of `joseph3d_fwd_tof_lm`, added to `image`
pub fn joseph3d_back_tof_lm(
    starts     : &[Lengthf32],
    ends       : &[Lengthf32],
    image      : &mut [f32],
    geometry   : ImageGeometry,
    tof        : ListmodeTof,
    projections: &[f32],
    job_size   : usize,
) -> Result<(), ProjectorError> {
    let (nlors, kernel, sigma, offset) = tof_setup(
        starts, ends, tof.sigma, tof.center_offset, tof.bin_width, tof.num_sigmas, TofBins::Listmode)?;
    let fov = geometry.fov()?;
    check_len("image voxels", fov.n_voxels(), image.len())?;
    check_len("TOF bins", nlors, tof.bins.len())?;
    check_len("projections", nlors, projections.len())?;
    if nlors == 0 { return Ok(()) }
    let lors = batch(starts, ends, sigma, offset)?.with_tof_bins(tof.bins.to_vec())?;
    let back = back_project_lors(&Joseph::with_tof(fov, kernel), &lors, projections, job_size)?;
    image.iter_mut().zip(back).for_each(|(i, b)| *i += b);
    Ok(())
}

/// TOF sinogram forward projection: `num_bins` values per LOR, LOR-major
pub fn joseph3d_fwd_tof_sino(
    starts     : &[Lengthf32],
    ends       : &[Lengthf32],
    image      : &[f32],
    geometry   : ImageGeometry,
    tof        : SinogramTof,
    projections: &mut [f32],
    job_size   : usize,
) -> Result<(), ProjectorError> {
    let bins = TofBins::Sinogram { num_bins: tof.num_bins };
    let (nlors, kernel, sigma, offset) = tof_setup(
        starts, ends, tof.sigma, tof.center_offset, tof.bin_width, tof.num_sigmas, bins)?;
    let fov = geometry.fov()?;
    check_len("image voxels", fov.n_voxels(), image.len())?;
    check_len("projections", nlors * tof.num_bins, projections.len())?;
    if nlors == 0 { return Ok(()) }
    let lors = batch(starts, ends, sigma, offset)?;
    let result = forward_project_lors(&Joseph::with_tof(fov, kernel), &lors, image, job_size)?;
    projections.copy_from_slice(&result);
    Ok(())
}

/// Adjoint of `joseph3d_fwd_tof_sino`, added to `image`
pub fn joseph3d_back_tof_sino(
    starts     : &[Lengthf32],
    ends       : &[Lengthf32],
    image      : &mut [f32],
    geometry   : ImageGeometry,
    tof        : SinogramTof,
    projections: &[f32],
    job_size   : usize,
) -> Result<(), ProjectorError> {
    let bins = TofBins::Sinogram { num_bins: tof.num_bins };
    let (nlors, kernel, sigma, offset) = tof_setup(
        starts, ends, tof.sigma, tof.center_offset, tof.bin_width, tof.num_sigmas, bins)?;
    let fov = geometry.fov()?;
    check_len("image voxels", fov.n_voxels(), image.len())?;
    check_len("projections", nlors * tof.num_bins, projections.len())?;
    if nlors == 0 { return Ok(()) }
    let lors = batch(starts, ends, sigma, offset)?;
    let back = back_project_lors(&Joseph::with_tof(fov, kernel), &lors, projections, job_size)?;
    image.iter_mut().zip(back).for_each(|(i, b)| *i += b);
    Ok(())
}

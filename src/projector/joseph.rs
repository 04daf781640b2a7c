//! Joseph's method for calculating the coupling between a LOR and the voxels
//! of the FOV.
//!
//! The algorithm is centred around two key simplifications:
//!
//! 1. March along the *dominant* axis of the LOR (the one along which its
//!    direction has the largest component) in steps of exactly one voxel,
//!    visiting the planes which contain the voxel centres. Every step covers
//!    the same distance along the LOR: `voxel_size / |cos θ|`.
//!
//! 2. In each plane, interpolate bilinearly between the four voxels whose
//!    centres surround the point where the LOR pierces the plane. Neighbours
//!    which lie outside the FOV contribute nothing.
//!
//! The segment is clipped against the FOV analytically before marching, so
//! LORs which miss the FOV cost almost nothing and never touch the image.

use units::todo::{Lengthf32, Ratiof32};

use crate::{
    LOR, LorBatch,
    fov::FOV,
    gauss::Gaussian,
    index::index3_to_1,
    system_matrix::{SystemMatrix, SystemMatrixRow},
    types::dominant_axis,
};

use super::ProjectorError;

/// How the TOF measurement bins of a LOR are organized
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TofBins {
    /// One measurement per LOR, in the TOF bin recorded in the `LorBatch`
    Listmode,
    /// Every LOR is measured in all `num_bins` TOF bins, numbered
    /// `-(num_bins/2) .. num_bins - num_bins/2`
    Sinogram { num_bins: usize },
}

/// Parameters of the TOF response along each LOR.
///
/// All lengths are in mm, measured along the LOR. `sigma` and
/// `center_offset` may be overridden per LOR by the `LorBatch`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TofKernel {
    sigma: Lengthf32,
    bin_width: Lengthf32,
    center_offset: Lengthf32,
    num_sigmas: Ratiof32,
    bins: TofBins,
}

impl TofKernel {

    pub fn new(sigma: Lengthf32, bin_width: Lengthf32, num_sigmas: Ratiof32, bins: TofBins) -> Result<Self, ProjectorError> {
        let kernel = Self { sigma, bin_width, center_offset: 0.0, num_sigmas, bins };
        kernel.check()?;
        Ok(kernel)
    }

    /// Shift the centre of TOF bin 0 by `center_offset` towards `p2`. The
    /// offset is checked when the kernel is given to a projector.
    pub fn with_center_offset(self, center_offset: Lengthf32) -> Self {
        Self { center_offset, ..self }
    }

    pub fn sigma        (&self) -> Lengthf32 { self.sigma }
    pub fn bin_width    (&self) -> Lengthf32 { self.bin_width }
    pub fn center_offset(&self) -> Lengthf32 { self.center_offset }
    pub fn num_sigmas   (&self) -> Ratiof32  { self.num_sigmas }
    pub fn bins         (&self) -> TofBins   { self.bins }

    fn check(&self) -> Result<(), ProjectorError> {
        let positive = |name, value: f32| {
            if value > 0.0 && value.is_finite() { Ok(()) }
            else { Err(ProjectorError::InvalidTof { name, value }) }
        };
        positive("sigma"     , self.sigma)?;
        positive("bin width" , self.bin_width)?;
        positive("num sigmas", self.num_sigmas)?;
        if !self.center_offset.is_finite() {
            return Err(ProjectorError::InvalidTof { name: "centre offset", value: self.center_offset })
        }
        if let TofBins::Sinogram { num_bins: 0 } = self.bins {
            return Err(ProjectorError::InvalidTof { name: "number of bins", value: 0.0 })
        }
        Ok(())
    }

    /// Number of measurement bins per LOR
    pub fn bins_per_lor(&self) -> usize {
        match self.bins {
            TofBins::Listmode => 1,
            TofBins::Sinogram { num_bins } => num_bins,
        }
    }

    /// Signed index of the `n`th sinogram TOF bin
    pub fn sinogram_bin(&self, n: usize) -> i32 {
        match self.bins {
            TofBins::Listmode => 0,
            TofBins::Sinogram { num_bins } => n as i32 - (num_bins / 2) as i32,
        }
    }
}

/// Fully resolved TOF parameters of a single measurement bin of a single LOR
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TofSample {
    pub bin: i32,
    pub sigma: Lengthf32,
    pub bin_width: Lengthf32,
    pub center_offset: Lengthf32,
    pub num_sigmas: Ratiof32,
}

/// Joseph projector, with optional TOF.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Joseph {
    fov: FOV,
    tof: Option<TofKernel>,
}

impl Joseph {

    pub fn new(fov: FOV) -> Self { Self { fov, tof: None } }

    pub fn with_tof(fov: FOV, tof: TofKernel) -> Self { Self { fov, tof: Some(tof) } }

    pub fn tof(&self) -> Option<TofKernel> { self.tof }

    /// TOF parameters of bin `bin` of LOR `lor`, taking per-LOR overrides into
    /// account.
    fn tof_sample(&self, lors: &LorBatch, lor: usize, bin: usize) -> Option<TofSample> {
        self.tof.map(|kernel| TofSample {
            bin: match kernel.bins {
                // `check_lors` guarantees that the bins are present
                TofBins::Listmode        => lors.tof_bin(lor).unwrap_or(0),
                TofBins::Sinogram { .. } => kernel.sinogram_bin(bin),
            },
            sigma        : lors.tof_sigma (lor).unwrap_or(kernel.sigma),
            center_offset: lors.tof_offset(lor).unwrap_or(kernel.center_offset),
            bin_width    : kernel.bin_width,
            num_sigmas   : kernel.num_sigmas,
        })
    }

    /// System matrix row of a single LOR, allocated afresh. Convenient for
    /// inspection and testing; the projection loops reuse their buffers.
    pub fn new_system_matrix_row(&self, lor: &LOR, tof: Option<TofSample>) -> SystemMatrixRow {
        let mut system_matrix_row = SystemMatrixRow::with_capacity(max_row_length(&self.fov));
        update_joseph_row(&mut system_matrix_row, lor, &self.fov, tof);
        system_matrix_row
    }
}

impl SystemMatrix for Joseph {

    fn fov(&self) -> FOV { self.fov }

    fn bins_per_lor(&self) -> usize { self.tof.map_or(1, |t| t.bins_per_lor()) }

    fn check_lors(&self, lors: &LorBatch) -> Result<(), ProjectorError> {
        if let Some(kernel) = self.tof {
            kernel.check()?;
            if kernel.bins == TofBins::Listmode && !lors.has_tof_bins() {
                return Err(ProjectorError::MissingTofBins)
            }
        }
        for index in 0..lors.len() {
            if let Some(sigma) = lors.tof_sigma(index) {
                if !(sigma > 0.0 && sigma.is_finite()) {
                    return Err(ProjectorError::InvalidLorTof { index, name: "sigma", value: sigma })
                }
            }
            if let Some(offset) = lors.tof_offset(index) {
                if !offset.is_finite() {
                    return Err(ProjectorError::InvalidLorTof { index, name: "centre offset", value: offset })
                }
            }
        }
        Ok(())
    }

    fn update_system_matrix_row(&self, system_matrix_row: &mut SystemMatrixRow, lors: &LorBatch, lor: usize, bin: usize) {
        let tof = self.tof_sample(lors, lor, bin);
        update_joseph_row(system_matrix_row, &lors.lors()[lor], &self.fov, tof);
    }

    fn buffers(&self) -> SystemMatrixRow {
        SystemMatrixRow::with_capacity(max_row_length(&self.fov))
    }
}

/// Up to four voxels in each plane along the longest axis
fn max_row_length(fov: &FOV) -> usize {
    4 * fov.n().iter().max().copied().unwrap_or(0)
}

/// For a single LOR, place the weights and indices of the coupled voxels in
/// `system_matrix_row`. Using an output parameter rather than a return value,
/// because this function is called in the inner loop, and allocating the
/// vectors of results repeatedly, had a noticeable impact on performance.
///
/// Degenerate LORs and LORs which miss the FOV leave the row empty.
pub fn update_joseph_row(
    system_matrix_row: &mut SystemMatrixRow,
    lor: &LOR,
    fov: &FOV,
    tof: Option<TofSample>,
) {
    // Throw away previous LOR's values
    system_matrix_row.clear();

    let LOR { p1, p2 } = *lor;

    // Parametric range of the LOR inside the FOV: 0 at p1, 1 at p2
    let Some((mut t_in, mut t_out)) = fov.clip(p1, p2) else { return };

    let d = p2 - p1;
    let length = d.norm();

    // TOF: Gaussian centred on the middle of this TOF bin
    let tof = tof.map(|tof| {
        let gauss = Gaussian::new(tof.sigma, Some(tof.num_sigmas));
        let bin_centre = 0.5 * length + tof.bin as Lengthf32 * tof.bin_width + tof.center_offset;
        (gauss, bin_centre, tof.bin_width)
    });

    // Samples beyond the truncated TOF kernel have zero weight: don't visit them
    if let Some((gauss, bin_centre, _)) = &tof {
        t_in  = t_in .max((bin_centre - gauss.cutoff()) / length);
        t_out = t_out.min((bin_centre + gauss.cutoff()) / length);
        if t_in >= t_out { return }
    }

    let axis = dominant_axis(&d);
    let (b, c) = ((axis + 1) % 3, (axis + 2) % 3);
    let n = fov.n();
    let voxel_size = fov.voxel_size();
    let origin = fov.origin();

    // Non-zero: `d` is not degenerate, and this is its largest component
    let d_axis = d[axis];

    // Distance along the LOR between consecutive planes
    let step = voxel_size[axis] * length / d_axis.abs();

    // Range of planes (voxel indices along the dominant axis) within the clipped LOR
    let plane_coordinate = |t: Lengthf32| (p1[axis] + t * d_axis - origin[axis]) / voxel_size[axis];
    let (f_in, f_out) = (plane_coordinate(t_in), plane_coordinate(t_out));
    let (f_lo, f_hi) = if f_in <= f_out { (f_in, f_out) } else { (f_out, f_in) };
    let first = f_lo.ceil().max(0.0);
    let last  = f_hi.floor().min((n[axis] - 1) as Lengthf32);
    if last < first { return }
    let (first, last) = (first as usize, last as usize);

    let (nb, nc) = (n[b] as i64, n[c] as i64);

    for plane in first..=last {
        // Where the LOR pierces this plane
        let x_axis = origin[axis] + plane as Lengthf32 * voxel_size[axis];
        let t = (x_axis - p1[axis]) / d_axis;

        let mut weight = step;

        // If TOF enabled, adjust weight by probability of this TOF bin
        if let Some((gauss, bin_centre, bin_width)) = &tof {
            weight *= bin_width * gauss.call(t * length - bin_centre);
            if weight <= 0.0 { continue }
        }

        // Transverse position in voxel units, relative to centre of voxel 0
        let fb = (p1[b] + t * d[b] - origin[b]) / voxel_size[b];
        let fc = (p1[c] + t * d[c] - origin[c]) / voxel_size[c];
        let (ib, ic) = (fb.floor(), fc.floor());
        let (wb, wc) = (fb - ib, fc - ic);
        let (ib, ic) = (ib as i64, ic as i64);

        for (jb, wb) in [(ib, 1.0 - wb), (ib + 1, wb)] {
            if jb < 0 || jb >= nb { continue }
            for (jc, wc) in [(ic, 1.0 - wc), (ic + 1, wc)] {
                if jc < 0 || jc >= nc { continue }
                let w = weight * wb * wc;
                if w > 0.0 {
                    let mut index = [0; 3];
                    index[axis] = plane;
                    index[b] = jb as usize;
                    index[c] = jc as usize;
                    system_matrix_row.push(index3_to_1(index, n), w);
                }
            }
        }
    }
}

//! Configuration file parser for OSEM reconstructions

use std::{fs, path::{Path, PathBuf}};

use serde::Deserialize;
use thiserror::Error;

use units::{Length, Time, mm, mm_, tof_time_to_length};

use crate::{
    fov::{FOV, GeometryError},
    projector::{DEFAULT_JOB_SIZE, ProjectorError, TofBins, TofKernel},
    subsets::{Partition, PartitionError, PartitionStrategy, SubsetOrder},
};

use super::{deserialize_uom, deserialize_uom_3d, deserialize_uom_opt};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("couldn't read config file {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Projector(#[from] ProjectorError),

    #[error(transparent)]
    Partition(#[from] PartitionError),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {

    /// Number of passes over all subsets
    pub iterations: usize,

    /// Number of OSEM subsets per iteration
    #[serde(default = "default_subsets")]
    pub subsets: usize,

    /// How the measurements are dealt out to subsets
    #[serde(default = "default_partition")]
    pub partition: PartitionStrategy,

    /// Visit subsets `0, s, 2s, ..., 1, 1+s, ...`; sequentially if absent
    #[serde(default)]
    pub order_stride: Option<usize>,

    /// Number of LORs handed to each parallel projection job
    #[serde(default = "default_job_size")]
    pub job_size: usize,

    pub image: Image,

    pub tof: Option<Tof>,

    pub resolution: Option<Resolution>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Image {
    pub nvoxels: [usize; 3],
    #[serde(deserialize_with = "deserialize_uom_3d")]
    pub voxel_size: (Length, Length, Length),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Tof {
    /// Coincidence timing resolution (standard deviation)
    #[serde(deserialize_with = "deserialize_uom")]
    pub sigma: Time,

    #[serde(deserialize_with = "deserialize_uom")]
    pub bin_width: Length,

    /// Gaussian is truncated beyond this many sigmas
    #[serde(default = "default_num_sigmas")]
    pub num_sigmas: f32,

    /// Number of TOF bins of sinogram data; listmode if absent
    pub num_bins: Option<usize>,

    #[serde(default)]
    #[serde(deserialize_with = "deserialize_uom_opt")]
    pub center_offset: Option<Length>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Resolution {
    /// Full width at half maximum of the scanner's spatial resolution
    #[serde(deserialize_with = "deserialize_uom")]
    pub fwhm: Length,
}

fn default_subsets() -> usize { 1 }
fn default_partition() -> PartitionStrategy { PartitionStrategy::Interleaved }
fn default_job_size() -> usize { DEFAULT_JOB_SIZE }
fn default_num_sigmas() -> f32 { 3.0 }

/// FWHM of a Gaussian, in units of its standard deviation: `2 sqrt(2 ln 2)`
const FWHM_PER_SIGMA: f32 = 2.354_82;

pub fn read_config_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let config = fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_owned(), source })?;
    Ok(toml::from_str(&config)?)
}

impl Config {

    pub fn fov(&self) -> Result<FOV, ConfigError> {
        let (dx, dy, dz) = self.image.voxel_size;
        Ok(FOV::centred(self.image.nvoxels, [mm_(dx), mm_(dy), mm_(dz)])?)
    }

    /// TOF kernel, with the timing resolution converted into a distance
    /// along the LOR.
    pub fn tof_kernel(&self) -> Result<Option<TofKernel>, ConfigError> {
        let Some(tof) = &self.tof else { return Ok(None) };
        let bins = match tof.num_bins {
            Some(num_bins) => TofBins::Sinogram { num_bins },
            None           => TofBins::Listmode,
        };
        let sigma = mm_(tof_time_to_length(tof.sigma));
        let kernel = TofKernel::new(sigma, mm_(tof.bin_width), tof.num_sigmas, bins)?
            .with_center_offset(mm_(tof.center_offset.unwrap_or(mm(0.0))));
        Ok(Some(kernel))
    }

    /// Partition of `len` measurements into the configured number of subsets
    pub fn partition(&self, len: usize) -> Result<Partition, ConfigError> {
        Ok(Partition::new(self.partition, len, self.subsets)?)
    }

    pub fn subset_order(&self) -> SubsetOrder {
        match self.order_stride {
            Some(stride) => SubsetOrder::Interleaved { stride },
            None         => SubsetOrder::Sequential,
        }
    }

    /// Standard deviation of the resolution model along each axis, in voxels
    pub fn resolution_sigma_voxels(&self) -> Option<[f32; 3]> {
        let fwhm = mm_(self.resolution.as_ref()?.fwhm);
        let (dx, dy, dz) = self.image.voxel_size;
        Some([dx, dy, dz].map(|d| fwhm / FWHM_PER_SIGMA / mm_(d)))
    }
}

// ----------------------------------- CLI -----------------------------------
use clap::Parser;

#[derive(clap::Parser, Debug, Clone)]
#[clap(
    name = "osem",
    about = "OSEM reconstruction of a simulated hot-rod phantom seen by a ring scanner",
)]
pub struct Cli {

    /// Reconstruction parameters
    #[clap(short, long, default_value = "osem-config.toml")]
    pub config: PathBuf,

    /// Radius of the detector ring (mm)
    #[clap(short, long, default_value = "70")]
    pub radius: f32,

    /// Number of detector elements around each ring
    #[clap(short, long, default_value = "120")]
    pub detectors: usize,

    /// Number of axial detector rings
    #[clap(long, default_value = "4")]
    pub rings: usize,

    /// Expected number of true coincidences in the whole dataset
    #[clap(long, default_value = "5e6")]
    pub counts: f32,

    /// Additive background (randoms, scatter) as a fraction of the mean true signal per bin
    #[clap(long, default_value = "0.05")]
    pub background: f32,

    /// Linear attenuation coefficient of the phantom material (per mm)
    #[clap(long, default_value = "0.0096")]
    pub mu: f32,

    /// Add Poisson noise to the simulated data
    #[clap(short, long)]
    pub noise: bool,

    /// Seed of the noise generator
    #[clap(long, default_value = "1")]
    pub seed: u64,

    /// Maximum number of rayon threads
    #[clap(short = 'j', long, default_value = "4")]
    pub num_threads: usize,
}

// --------------------------------------------------------------------------------

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use itertools::iproduct;
use ndarray::{Array2, ArrayD, Ix1, IxDyn};
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Poisson};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use josephem::{
    FOV, Image, LOR, LorBatch, Point,
    config::read_config_file,
    operator::{
        Array, Composite, ElementwiseMultiplication, GaussianFilter,
        JosephProjector, LinearOperator, SubsetOperator, vdot,
    },
    osem::Osem,
    projector::TofBins,
    utils::{group_digits, timing::Progress},
};

fn main() -> Result<(), Box<dyn Error>> {

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Cli::parse();
    let config = read_config_file(&args.config)?;
    info!(?config, "read {}", args.config.display());

    rayon::ThreadPoolBuilder::new().num_threads(args.num_threads).build_global()?;

    let mut progress = Progress::new();

    // --- Geometry ------------------------------------------------------------------
    let fov = config.fov()?;
    let tof = config.tof_kernel()?;
    if let Some(kernel) = tof {
        if kernel.bins() == TofBins::Listmode {
            return Err("the simulation produces TOF sinograms: set `tof.num_bins` in the config".into())
        }
    }
    progress.start("Generating LORs");
    let lors = Arc::new(ring_lors(&args, fov)?);
    progress.done_with_message(&format!("Generated {} LORs crossing the FOV", group_digits(lors.len())));

    // --- Phantom -------------------------------------------------------------------
    let phantom = hot_rod_phantom(fov, 1.0).to_array();
    let mu_map  = hot_rod_phantom(fov, 0.0).to_array().mapv(|inside| if inside > 0.0 { args.mu } else { 0.0 });

    // --- Attenuation, one factor per LOR, shared by all its TOF bins ---------------
    progress.start("Calculating attenuation factors");
    let path_integrals = JosephProjector::new(fov, lors.clone())?
        .with_job_size(config.job_size)
        .forward(&mu_map)?
        .into_dimensionality::<Ix1>()?;
    let bins_per_lor = tof.map_or(1, |kernel| kernel.bins_per_lor());
    let attenuation = Array2::from_shape_fn((lors.len(), bins_per_lor), |(i, _)| (-path_integrals[i]).exp());
    let attenuation = match tof {
        Some(_) => attenuation.into_dyn(),
        None    => attenuation.into_shape(lors.len())?.into_dyn(),
    };
    progress.done();

    // --- System model: attenuation ∘ projection ∘ resolution, per subset -----------
    progress.start("Building subset operators");
    let partition = config.partition(lors.len())?;
    let resolution = config.resolution_sigma_voxels();
    let operators = partition.split_lors(&lors)?.into_iter()
        .zip(partition.split_data(&attenuation)?)
        .map(|(lors, attenuation)| -> Result<Box<dyn LinearOperator>, Box<dyn Error>> {
            let lors = Arc::new(lors);
            let projector = match tof {
                Some(kernel) => JosephProjector::with_tof(fov, lors, kernel)?,
                None         => JosephProjector::new     (fov, lors)?,
            }.with_job_size(config.job_size);
            let mut chain: Vec<Box<dyn LinearOperator>> = vec![
                Box::new(ElementwiseMultiplication::new(attenuation)),
                Box::new(projector),
            ];
            if let Some(sigma) = resolution {
                chain.push(Box::new(GaussianFilter::new(&fov.shape(), &sigma)?));
            }
            Ok(Box::new(Composite::new(chain)?))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let operator = SubsetOperator::new(operators)?;
    progress.done_with_message(&format!("Built {} subset operators", operator.num_subsets()));

    // --- Simulated measurement -----------------------------------------------------
    progress.start("Simulating data");
    let (truth, data, additive) = simulate(&args, &operator, phantom)?;
    let total: f64 = data.iter().map(|y| y.iter().map(|&v| v as f64).sum::<f64>()).sum();
    progress.done_with_message(&format!("Simulated {} counts", group_digits(total.round() as u64)));

    // --- Reconstruction ------------------------------------------------------------
    let osem = Osem::new(&operator, data, additive)?;
    let order = config.subset_order();

    let bar = ProgressBar::new(config.iterations as u64).with_message("OSEM");
    bar.set_style(ProgressStyle::default_bar()
                  .template("{msg}\n[{elapsed_precise}] {wide_bar} {pos}/{len} ({eta_precise})")?
    );
    bar.tick();

    let x0 = ArrayD::from_elem(IxDyn(&fov.shape()), 1.0);
    let truth_norm = vdot(&truth, &truth).sqrt();
    progress.startln("Reconstructing");
    for (pass, x) in osem.iterate(x0, &order)?.take(config.iterations).enumerate() {
        let x = x?;
        let cost = osem.cost(&x)?;
        let difference = &x - &truth;
        let relative_error = vdot(&difference, &difference).sqrt() / truth_norm;
        bar.println(format!("pass {:>3}: cost {cost:>16.6e}   relative error {relative_error:.4}", pass + 1));
        if !cost.is_finite() { warn!(pass, "non-finite cost") }
        bar.inc(1);
    }
    bar.finish_and_clear();
    progress.done_with_message(&format!("Completed {} passes over {} subsets", config.iterations, osem.num_subsets()));
    Ok(())
}

/// Every pair of detector elements on a set of rings, keeping only the LORs
/// which cross the FOV. Elements less than a quarter turn apart are not
/// paired.
fn ring_lors(args: &Cli, fov: FOV) -> Result<LorBatch, Box<dyn Error>> {
    let &Cli { radius, detectors, rings, .. } = args;
    if radius <= 0.0 || detectors < 4 || rings == 0 {
        return Err(format!("unusable scanner: radius {radius} mm, {detectors} detectors, {rings} rings").into())
    }
    let axial_length = fov.upper_corner().z - fov.lower_corner().z;
    let ring_pitch = axial_length / rings as f32;
    let element = |d: usize, r: usize| {
        let phi = d as f32 * std::f32::consts::TAU / detectors as f32;
        let z = fov.lower_corner().z + (r as f32 + 0.5) * ring_pitch;
        Point::new(radius * phi.cos(), radius * phi.sin(), z)
    };
    let min_separation = detectors / 4;
    let lors = iproduct!(0..detectors, 0..detectors, 0..rings, 0..rings)
        .filter(|&(d1, d2, _, _)| d1 < d2 && (d2 - d1).min(detectors - (d2 - d1)) >= min_separation)
        .map(|(d1, d2, r1, r2)| LOR::new(element(d1, r1), element(d2, r2)))
        .filter(|lor| fov.clip(lor.p1, lor.p2).is_some())
        .collect();
    Ok(LorBatch::new(lors)?)
}

/// Warm water cylinder containing six hot rods of increasing radius. With
/// `rod_contrast` zero, the rods disappear and only the cylinder remains.
fn hot_rod_phantom(fov: FOV, rod_contrast: f32) -> Image {
    let lo = fov.lower_corner();
    let hi = fov.upper_corner();
    let half_width = (hi.x - lo.x).min(hi.y - lo.y) / 2.0;
    let cylinder_radius = 0.8 * half_width;
    let rod_distance = 0.45 * cylinder_radius;
    let rods: Vec<(f32, f32, f32)> = (0..6)
        .map(|i| {
            let phi = i as f32 * std::f32::consts::TAU / 6.0;
            let r = (0.08 + 0.03 * i as f32) * cylinder_radius;
            (rod_distance * phi.cos(), rod_distance * phi.sin(), r)
        })
        .collect();
    let centre = nalgebra::center(&lo, &hi);
    Image::from_fn(fov, |i| {
        let p = fov.voxel_centre(i);
        let (x, y) = (p.x - centre.x, p.y - centre.y);
        if x.hypot(y) > cylinder_radius { return 0.0 }
        let in_rod = rods.iter().any(|&(rx, ry, r)| (x - rx).hypot(y - ry) <= r);
        if in_rod { 1.0 + 3.0 * rod_contrast } else { 1.0 }
    })
}

/// Scale the phantom to the requested number of counts, and project it into
/// per-subset measurements and additive backgrounds.
fn simulate(args: &Cli, operator: &SubsetOperator, phantom: Array) -> Result<(Array, Vec<Array>, Vec<Array>), Box<dyn Error>> {
    let trues = operator.forward(&phantom)?;
    let total: f64 = trues.iter().map(|&v| v as f64).sum();
    if total <= 0.0 { return Err("the phantom is not seen by any LOR".into()) }
    let scale = (args.counts as f64 / total) as f32;
    let truth = phantom * scale;
    let background = args.background * args.counts / trues.len() as f32;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut data = vec![];
    let mut additive = vec![];
    for trues in operator.split(&trues)? {
        let expected = trues * scale + background;
        let measured = if args.noise {
            expected.mapv(|lambda| match Poisson::new(lambda as f64) {
                Ok(poisson) => poisson.sample(&mut rng) as f32,
                Err(_) => 0.0,
            })
        } else {
            expected
        };
        additive.push(Array::from_elem(measured.raw_dim(), background));
        data.push(measured);
    }
    Ok((truth, data, additive))
}

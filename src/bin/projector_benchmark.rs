// ----------------------------------- CLI -----------------------------------
use clap::Parser;

#[derive(clap::Parser, Debug, Clone)]
#[clap(
    name = "projector_benchmark",
    about = "Time forward and back projections over flat arrays, in sinogram and listmode",
)]
pub struct Cli {

    /// Number of timed runs of each projection (one untimed warm-up run precedes them)
    #[clap(short, long, default_value = "5")]
    pub n: usize,

    /// Project without TOF
    #[clap(long)]
    pub nontof: bool,

    /// Number of LORs in the sinogram projections
    #[clap(long, default_value = "1000000")]
    pub lors: usize,

    /// Number of listmode events (0 skips the listmode projections)
    #[clap(long, default_value = "1000000")]
    pub events: usize,

    /// Transverse size of the FOV (mm)
    #[clap(long, default_value = "600")]
    pub fov: f32,

    /// Voxel size (mm)
    #[clap(long, default_value = "2")]
    pub voxel_size: f32,

    /// Radius of the scanner (mm)
    #[clap(short, long, default_value = "400")]
    pub radius: f32,

    /// Axial length of the scanner (mm)
    #[clap(long, default_value = "160")]
    pub axial_length: f32,

    /// Number of TOF bins in the sinogram
    #[clap(long, default_value = "27")]
    pub tof_bins: usize,

    /// Width of the TOF bins (mm)
    #[clap(long, default_value = "23")]
    pub tof_bin_width: f32,

    /// FWHM of the TOF resolution (mm)
    #[clap(long, default_value = "60")]
    pub tof_fwhm: f32,

    /// Number of LORs handed to each parallel job
    #[clap(long, default_value = "256")]
    pub job_size: usize,

    /// Seed of the LOR generator
    #[clap(long, default_value = "1")]
    pub seed: u64,

    /// Maximum number of rayon threads
    #[clap(short = 'j', long, default_value = "4")]
    pub num_threads: usize,
}

// --------------------------------------------------------------------------------

use std::error::Error;
use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

use josephem::{
    FOV, Image,
    projector::{ProjectorError, raw::*},
    utils::{group_digits, timing::{Progress, mean_and_std}},
};

fn main() -> Result<(), Box<dyn Error>> {

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Cli::parse();
    info!(?args, "projector benchmark");

    rayon::ThreadPoolBuilder::new().num_threads(args.num_threads).build_global()?;

    let mut progress = Progress::new();

    // --- Image ---------------------------------------------------------------------
    let nxy = ((args.fov          / args.voxel_size) as usize).max(1);
    let nz  = ((args.axial_length / args.voxel_size) as usize).max(1);
    let fov = FOV::centred([nxy, nxy, nz], [args.voxel_size; 3])?;
    let origin = fov.origin();
    let geometry = ImageGeometry { origin: [origin.x, origin.y, origin.z], voxel_size: [args.voxel_size; 3], n: fov.n() };
    let image = ellipse_phantom(fov).data;
    println!("Image: {nxy} x {nxy} x {nz} = {} voxels", group_digits(fov.n_voxels()));

    let sigma = [args.tof_fwhm / 2.35];
    let center_offset = [0.0];
    let num_sigmas = 3.0;

    // --- Sinogram ------------------------------------------------------------------
    progress.start("Generating sinogram LORs");
    let mut rng = StdRng::seed_from_u64(args.seed);
    let (starts, ends) = random_lors(&mut rng, &args, args.lors);
    progress.done_with_message(&format!("Generated {} LORs", group_digits(args.lors)));

    let bins_per_lor = if args.nontof { 1 } else { args.tof_bins };
    let sino_tof = SinogramTof {
        num_bins: args.tof_bins, sigma: &sigma, center_offset: &center_offset,
        bin_width: args.tof_bin_width, num_sigmas,
    };
    let sino = vec![1.0; args.lors * bins_per_lor];
    let mut projections = vec![0.0; args.lors * bins_per_lor];
    let mut back_image = Image::zeros_buffer(fov);
    let (fwd, back) = time_runs(args.n, "sinogram",
        || if args.nontof {
            joseph3d_fwd(&starts, &ends, &image, geometry, &mut projections, args.job_size)
        } else {
            joseph3d_fwd_tof_sino(&starts, &ends, &image, geometry, sino_tof, &mut projections, args.job_size)
        },
        || if args.nontof {
            joseph3d_back(&starts, &ends, &mut back_image, geometry, &sino, args.job_size)
        } else {
            joseph3d_back_tof_sino(&starts, &ends, &mut back_image, geometry, sino_tof, &sino, args.job_size)
        },
    )?;
    report("sino fwd ", &fwd);
    report("sino back", &back);

    // --- Listmode ------------------------------------------------------------------
    if args.events == 0 { return Ok(()) }
    progress.start("Generating listmode events");
    let (starts, ends) = random_lors(&mut rng, &args, args.events);
    let half = (args.tof_bins / 2) as i32;
    let tof_bins: Vec<i32> = (0..args.events).map(|_| rng.gen_range(-half..=half)).collect();
    progress.done_with_message(&format!("Generated {} events", group_digits(args.events)));

    let lm_tof = ListmodeTof {
        bins: &tof_bins, sigma: &sigma, center_offset: &center_offset,
        bin_width: args.tof_bin_width, num_sigmas,
    };
    let values = vec![1.0; args.events];
    let mut projections = vec![0.0; args.events];
    let (fwd, back) = time_runs(args.n, "listmode",
        || if args.nontof {
            joseph3d_fwd(&starts, &ends, &image, geometry, &mut projections, args.job_size)
        } else {
            joseph3d_fwd_tof_lm(&starts, &ends, &image, geometry, lm_tof, &mut projections, args.job_size)
        },
        || if args.nontof {
            joseph3d_back(&starts, &ends, &mut back_image, geometry, &values, args.job_size)
        } else {
            joseph3d_back_tof_lm(&starts, &ends, &mut back_image, geometry, lm_tof, &values, args.job_size)
        },
    )?;
    report("LM fwd   ", &fwd);
    report("LM back  ", &back);
    Ok(())
}

/// Time `runs` forward and back projections, after one untimed warm-up run
fn time_runs(
    runs: usize,
    what: &str,
    mut forward : impl FnMut() -> Result<(), ProjectorError>,
    mut backward: impl FnMut() -> Result<(), ProjectorError>,
) -> Result<(Vec<Duration>, Vec<Duration>), ProjectorError> {
    let mut timer = Progress::new();
    let mut fwd  = Vec::with_capacity(runs);
    let mut back = Vec::with_capacity(runs);
    for run in 0..=runs {
        if run > 0 { println!("{what} run {run} / {runs}") }
        timer.lap();
        forward()?;
        let t_fwd = timer.lap();
        backward()?;
        let t_back = timer.lap();
        if run > 0 {
            fwd .push(t_fwd);
            back.push(t_back);
        }
    }
    Ok((fwd, back))
}

fn report(what: &str, laps: &[Duration]) {
    match mean_and_std(laps) {
        Some((mean, std)) => println!("{what} {mean:.4} s (mean) +- {std:.4} s (std)"),
        None => println!("{what} not timed"),
    }
}

/// `n` LORs joining uniformly distributed points on the scanner's cylinder
fn random_lors(rng: &mut StdRng, args: &Cli, n: usize) -> (Vec<f32>, Vec<f32>) {
    let half_length = args.axial_length / 2.0;
    let mut point = |coords: &mut Vec<f32>| {
        let phi: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
        coords.extend([
            args.radius * phi.cos(),
            args.radius * phi.sin(),
            rng.gen_range(-half_length..=half_length),
        ]);
    };
    let mut starts = Vec::with_capacity(3 * n);
    let mut ends   = Vec::with_capacity(3 * n);
    for _ in 0..n {
        point(&mut starts);
        point(&mut ends);
    }
    (starts, ends)
}

/// Elliptical cylinder with a hot elliptical core, along the whole axial extent
fn ellipse_phantom(fov: FOV) -> Image {
    let lo = fov.lower_corner();
    let hi = fov.upper_corner();
    let (a, b) = (0.4 * (hi.x - lo.x), 0.3 * (hi.y - lo.y));
    let inside = |x: f32, y: f32, scale: f32| (x / (scale * a)).powi(2) + (y / (scale * b)).powi(2) <= 1.0;
    Image::from_fn(fov, |i| {
        let p = fov.voxel_centre(i);
        if      inside(p.x, p.y, 0.3) { 4.0 }
        else if inside(p.x, p.y, 1.0) { 1.0 }
        else { 0.0 }
    })
}

use units::todo::{Lengthf32, Ratiof32};

const TWOPI: Lengthf32 = std::f32::consts::TAU;

/// Normal probability density truncated to zero beyond `cutoff` standard
/// deviations from the mean.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gaussian {
    sigma: Lengthf32,
    peak_height: Lengthf32,
    cutoff: Lengthf32,
}

impl Gaussian {

    pub fn new(sigma: Lengthf32, cutoff: Option<Ratiof32>) -> Self {
        let root_two_pi = TWOPI.sqrt();
        let peak_height = 1.0 / (sigma * root_two_pi);
        let cutoff = cutoff.map_or(Lengthf32::INFINITY, |width| width * sigma);
        Self { sigma, peak_height, cutoff }
    }

    /// Half-width of the region in which the density is non-zero
    pub fn cutoff(&self) -> Lengthf32 { self.cutoff }

    #[inline]
    pub fn call(&self, dx: Lengthf32) -> Lengthf32 {
        if dx.abs() <= self.cutoff {
            let y = dx / self.sigma;
            self.peak_height * (-0.5 * y * y).exp()
        } else {
            0.0
        }
    }
}

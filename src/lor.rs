use std::fmt;

use thiserror::Error;

use crate::Point;
use units::todo::Lengthf32;

/// Line Of Response.
///
/// The segment between the two detector elements which registered a
/// coincidence. Measurements are integrals of activity along this segment.
#[derive(Clone, Copy, Debug, PartialEq)]
#[allow(clippy::upper_case_acronyms)]
pub struct LOR {
    pub p1: Point,
    pub p2: Point,
}

impl LOR {
    pub fn new(p1: Point, p2: Point) -> Self { Self { p1, p2 } }

    pub fn from_components((x1, y1, z1): (Lengthf32, Lengthf32, Lengthf32),
                           (x2, y2, z2): (Lengthf32, Lengthf32, Lengthf32),
                          ) -> Self
    {
        Self::new(Point::new(x1,y1,z1), Point::new(x2,y2,z2))
    }

    pub fn length(&self) -> Lengthf32 { (self.p2 - self.p1).norm() }

    pub fn midpoint(&self) -> Point { nalgebra::center(&self.p1, &self.p2) }
}

impl fmt::Display for LOR {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (p, q) = (self.p1, self.p2);
        write!(f, "<LOR ({:8.2} {:8.2} {:8.2}) ({:8.2} {:8.2} {:8.2}) /{:7.2} >",
               p.x, p.y, p.z,
               q.x, q.y, q.z,
               self.length(),
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LorError {
    #[error("LOR batch is empty")]
    Empty,

    #[error("{what}: expected {expected} values, got {actual}")]
    LengthMismatch { what: &'static str, expected: usize, actual: usize },

    #[error("flat coordinate array has {0} elements, which is not a multiple of 3")]
    NotTriplets(usize),

    #[error("LOR {index} has a non-finite coordinate")]
    NonFinite { index: usize },
}

/// An ordered collection of LORs, optionally carrying per-LOR TOF information.
///
/// The position of a LOR in the batch is the position of its measurement in
/// the flat data vector. Batches are immutable once built, and are shared
/// between operators through `Arc`s.
#[derive(Clone, Debug, PartialEq)]
pub struct LorBatch {
    lors: Vec<LOR>,
    tof_bins: Option<Vec<i32>>,
    tof_sigmas: Option<Vec<Lengthf32>>,
    tof_offsets: Option<Vec<Lengthf32>>,
}

impl LorBatch {

    pub fn new(lors: Vec<LOR>) -> Result<Self, LorError> {
        if lors.is_empty() { return Err(LorError::Empty) }
        for (index, lor) in lors.iter().enumerate() {
            if !(lor.p1.coords.iter().all(|c| c.is_finite()) && lor.p2.coords.iter().all(|c| c.is_finite())) {
                return Err(LorError::NonFinite { index })
            }
        }
        Ok(Self { lors, tof_bins: None, tof_sigmas: None, tof_offsets: None })
    }

    pub fn from_points(starts: &[Point], ends: &[Point]) -> Result<Self, LorError> {
        check_len("end points", starts.len(), ends.len())?;
        Self::new(starts.iter().zip(ends).map(|(&p1, &p2)| LOR::new(p1, p2)).collect())
    }

    /// Build from flat `[x0, y0, z0, x1, y1, z1, ...]` start and end coordinates
    pub fn from_flat(starts: &[Lengthf32], ends: &[Lengthf32]) -> Result<Self, LorError> {
        if starts.len() % 3 != 0 { return Err(LorError::NotTriplets(starts.len())) }
        check_len("end coordinates", starts.len(), ends.len())?;
        let points = |xs: &[Lengthf32]| -> Vec<Point> {
            xs.chunks_exact(3).map(|c| Point::new(c[0], c[1], c[2])).collect()
        };
        Self::from_points(&points(starts), &points(ends))
    }

    /// Attach TOF bin indices, one per LOR. Bin `0` is centred on the LOR's
    /// midpoint; positive bins lie towards `p2`.
    pub fn with_tof_bins(mut self, bins: Vec<i32>) -> Result<Self, LorError> {
        check_len("TOF bins", self.len(), bins.len())?;
        self.tof_bins = Some(bins);
        Ok(self)
    }

    /// Per-LOR TOF resolution (standard deviation, in mm along the LOR),
    /// overriding the one in the projector's `TofKernel`.
    pub fn with_tof_sigmas(mut self, sigmas: Vec<Lengthf32>) -> Result<Self, LorError> {
        check_len("TOF sigmas", self.len(), sigmas.len())?;
        self.tof_sigmas = Some(sigmas);
        Ok(self)
    }

    /// Per-LOR shift of TOF bin centres along the LOR (mm), overriding the one
    /// in the projector's `TofKernel`.
    pub fn with_tof_offsets(mut self, offsets: Vec<Lengthf32>) -> Result<Self, LorError> {
        check_len("TOF centre offsets", self.len(), offsets.len())?;
        self.tof_offsets = Some(offsets);
        Ok(self)
    }

    pub fn len(&self) -> usize { self.lors.len() }

    // Construction guarantees at least one LOR
    pub fn is_empty(&self) -> bool { false }

    pub fn lors(&self) -> &[LOR] { &self.lors }

    pub fn iter(&self) -> std::slice::Iter<LOR> { self.lors.iter() }

    pub fn tof_bin   (&self, i: usize) -> Option<i32>       { self.tof_bins   .as_ref().map(|v| v[i]) }
    pub fn tof_sigma (&self, i: usize) -> Option<Lengthf32> { self.tof_sigmas .as_ref().map(|v| v[i]) }
    pub fn tof_offset(&self, i: usize) -> Option<Lengthf32> { self.tof_offsets.as_ref().map(|v| v[i]) }

    pub fn has_tof_bins(&self) -> bool { self.tof_bins.is_some() }

    /// New batch made of the LORs at `indices`, in that order, together with
    /// their TOF information.
    pub fn select(&self, indices: &[usize]) -> Result<Self, LorError> {
        fn pick<T: Copy>(v: &Option<Vec<T>>, indices: &[usize]) -> Option<Vec<T>> {
            v.as_ref().map(|v| indices.iter().map(|&i| v[i]).collect())
        }
        if indices.is_empty() { return Err(LorError::Empty) }
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(LorError::LengthMismatch { what: "LOR index", expected: self.len(), actual: bad })
        }
        Ok(Self {
            lors       : indices.iter().map(|&i| self.lors[i]).collect(),
            tof_bins   : pick(&self.tof_bins   , indices),
            tof_sigmas : pick(&self.tof_sigmas , indices),
            tof_offsets: pick(&self.tof_offsets, indices),
        })
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), LorError> {
    if expected == actual { Ok(()) }
    else { Err(LorError::LengthMismatch { what, expected, actual }) }
}

#[cfg(test)]
mod test_lor_batch {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    fn three() -> LorBatch {
        LorBatch::from_flat(
            &[0.0, 0.0, 0.0,   1.0, 1.0, 1.0,   2.0, 2.0, 2.0],
            &[9.0, 0.0, 0.0,   9.0, 1.0, 1.0,   9.0, 2.0, 2.0],
        ).unwrap()
    }

    #[test]
    fn flat_coordinates_become_points() {
        let batch = three();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.lors()[1], LOR::from_components((1.0, 1.0, 1.0), (9.0, 1.0, 1.0)));
    }

    #[test]
    fn flat_coordinates_must_be_triplets() {
        assert_eq!(LorBatch::from_flat(&[0.0; 4], &[0.0; 4]), Err(LorError::NotTriplets(4)));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(LorBatch::from_flat(&[0.0; 6], &[0.0; 3]).is_err());
        assert!(three().with_tof_bins(vec![0, 1]).is_err());
        assert!(three().with_tof_sigmas(vec![1.0; 4]).is_err());
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert_eq!(LorBatch::new(vec![]), Err(LorError::Empty));
    }

    #[test]
    fn selection_carries_tof_information() {
        let batch = three().with_tof_bins(vec![-1, 0, 1]).unwrap();
        let sub = batch.select(&[2, 0]).unwrap();
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.lors()[0], batch.lors()[2]);
        assert_eq!(sub.tof_bin(0), Some(1));
        assert_eq!(sub.tof_bin(1), Some(-1));
        assert_eq!(sub.tof_sigma(0), None);
        assert!(batch.select(&[3]).is_err());
    }
}

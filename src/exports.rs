pub use units::todo::{Intensityf32, Lengthf32, Ratiof32, Weightf32};

pub use crate::types::{Point, Vector};
pub use crate::index::{BoxDim_u, Index1_u, Index3_u};

pub use crate::fov::FOV;
pub use crate::image::{Image, ImageData};
pub use crate::lor::{LOR, LorBatch};
pub use crate::operator::{LinearOperator, OperatorError};
pub use crate::projector::{Joseph, TofKernel, TofBins};

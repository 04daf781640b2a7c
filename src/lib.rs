mod exports;
pub use exports::*;

pub mod types;
pub mod index;
pub mod fov;
pub mod image;
pub mod lor;
pub mod gauss;
pub mod system_matrix;
pub mod projector;
pub mod operator;
pub mod subsets;
pub mod osem;
pub mod config;
pub mod utils;

//! Image operators shared by the montage solvers.
//!
//! - [`color`]: RGB to luma conversion
//! - [`edges`]: signed Sobel gradient fields for gray and color images

pub mod color;
pub mod edges;

pub use color::*;
pub use edges::*;

pub use montage_core::{Error, Result};

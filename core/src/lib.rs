//! Shared building blocks for the montage workspace.
//!
//! - [`Error`] / [`Result`]: the single error type every stage reports through
//! - [`LabelMap`] / [`LabelConstraint`]: per-pixel source-image assignments
//! - [`Diagnostics`]: textual log returned alongside every stage result
//! - [`runtime`]: global Rayon pool setup

pub mod diagnostics;
pub mod error;
pub mod image;
pub mod runtime;

pub use diagnostics::*;
pub use error::*;
pub use image::*;
pub use runtime::{current_cpu_threads, init_global_thread_pool};

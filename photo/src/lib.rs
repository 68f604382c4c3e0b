//! Digital photomontage
//!
//! Composites several aligned photographs of one scene into a single image.
//!
//! # Stages
//!
//! - **Label matching**: turns a few painted hints ("take this region from
//!   image 2") into a dense per-pixel source assignment by minimizing a
//!   seam-aware energy with graph cuts
//! - **Gradient fusion**: rebuilds the composite from the gradients of the
//!   chosen sources, hiding the seams left by plain copying
//!
//! # Example
//!
//! ```no_run
//! # use montage_photo::{FusionParams, LabelMatchParams, MontageSession};
//! # use image::{GrayImage, RgbImage};
//! # fn run(images: Vec<RgbImage>, mask: GrayImage) -> montage_photo::Result<()> {
//! let mut session = MontageSession::new(images)?;
//! session.set_mask(1, mask)?;
//! session.run_label_match(&LabelMatchParams::default())?;
//! let fused = session.run_gradient_fusion(&FusionParams::default())?;
//! println!("{}", fused.diagnostics);
//! # Ok(())
//! # }
//! ```

pub use montage_core::{Error, Result};

/// Data and smoothness costs
pub mod energy;
/// Gradient-domain fusion
pub mod fusion;
/// Graph-cut label matching
pub mod label_match;
pub mod params;
/// Session holding sources, masks and the last label map
pub mod session;
pub mod visualize;

pub use energy::MontageEnergy;
pub use fusion::{ChannelReport, FusionResult, GradientFusion};
pub use label_match::{LabelMatchResult, LabelMatcher};
pub use params::{FusionParams, LabelMatchParams, SmoothMode};
pub use session::MontageSession;
pub use visualize::{composite_image, fill_label_colors, label_color_map};

pub use montage_optimize::SolverBackend;

pub use montage_core as core;
pub use montage_imgproc as imgproc;
pub use montage_optimize as optimize;
pub use montage_photo as photo;

pub use montage_core::{Diagnostics, Error, Label, LabelConstraint, LabelMap, Result};
pub use montage_photo::{
    FusionParams, FusionResult, GradientFusion, LabelMatchParams, LabelMatchResult, LabelMatcher,
    MontageSession, SmoothMode, SolverBackend,
};

/// Initialize a single global Rayon thread pool for all CPU-parallel routines.
///
/// Call this once at application startup before running label matching or
/// fusion. Repeated calls are idempotent and return the first initialization
/// result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `MONTAGE_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<()> {
    montage_core::init_global_thread_pool(num_threads)
}

use montage_core::Diagnostics;
use montage_optimize::{CgSolver, SolverBackend};

pub const DEFAULT_LARGE_PENALTY: f64 = 1000.0;
pub const DEFAULT_SMOOTH_ALPHA: f64 = 100.0;
/// Alpha substituted in [`SmoothMode::PlainDividedByEdge`], where the color
/// term is already normalized by the edge strength.
pub const DEFAULT_EDGE_RATIO_ALPHA: f64 = 1.0;
pub const DEFAULT_EXPANSION_CYCLES: usize = 2;
pub const DEFAULT_FUSION_TOLERANCE: f64 = 1e-6;

/// How the seam cost between two neighbouring pixels is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmoothMode {
    /// Color difference of the two sources at both pixels.
    #[default]
    Plain,
    /// Color difference plus the difference of the per-channel Sobel
    /// gradients of both sources at both pixels.
    PlainPlusEdge6,
    /// Color difference divided by the gray edge strength across the seam.
    PlainDividedByEdge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelMatchParams {
    pub large_penalty: f64,
    pub smooth_alpha: f64,
    pub smooth_mode: SmoothMode,
    /// Expansion cycles. Swap-based modes always run `2 * N` cycles.
    pub expansion_cycles: usize,
    /// Visualization colors by label; missing entries are generated.
    pub label_colors: Vec<[u8; 3]>,
    pub color_seed: Option<u64>,
}

impl Default for LabelMatchParams {
    fn default() -> Self {
        Self {
            large_penalty: DEFAULT_LARGE_PENALTY,
            smooth_alpha: DEFAULT_SMOOTH_ALPHA,
            smooth_mode: SmoothMode::Plain,
            expansion_cycles: DEFAULT_EXPANSION_CYCLES,
            label_colors: Vec::new(),
            color_seed: None,
        }
    }
}

impl LabelMatchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_large_penalty(mut self, penalty: f64) -> Self {
        self.large_penalty = penalty;
        self
    }

    pub fn with_smooth_alpha(mut self, alpha: f64) -> Self {
        self.smooth_alpha = alpha;
        self
    }

    pub fn with_smooth_mode(mut self, mode: SmoothMode) -> Self {
        self.smooth_mode = mode;
        self
    }

    pub fn with_expansion_cycles(mut self, cycles: usize) -> Self {
        self.expansion_cycles = cycles;
        self
    }

    pub fn with_label_colors(mut self, colors: Vec<[u8; 3]>) -> Self {
        self.label_colors = colors;
        self
    }

    pub fn with_color_seed(mut self, seed: u64) -> Self {
        self.color_seed = Some(seed);
        self
    }

    /// Copy with out-of-range values replaced by safe defaults; each
    /// substitution is logged as a warning.
    pub fn sanitized(&self, diagnostics: &mut Diagnostics) -> Self {
        let mut p = self.clone();

        if !(p.large_penalty.is_finite() && p.large_penalty > 0.0) {
            diagnostics.warn(format!(
                "large_penalty {} is invalid, using {DEFAULT_LARGE_PENALTY}",
                p.large_penalty
            ));
            p.large_penalty = DEFAULT_LARGE_PENALTY;
        }

        if !(p.smooth_alpha.is_finite() && p.smooth_alpha >= 0.0) {
            let fallback = match p.smooth_mode {
                SmoothMode::PlainDividedByEdge => DEFAULT_EDGE_RATIO_ALPHA,
                SmoothMode::Plain | SmoothMode::PlainPlusEdge6 => DEFAULT_SMOOTH_ALPHA,
            };
            diagnostics.warn(format!("smooth_alpha {} is invalid, using {fallback}", p.smooth_alpha));
            p.smooth_alpha = fallback;
        }

        if p.expansion_cycles == 0 {
            diagnostics.warn(format!("expansion_cycles is 0, using {DEFAULT_EXPANSION_CYCLES}"));
            p.expansion_cycles = DEFAULT_EXPANSION_CYCLES;
        }

        p
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    pub backend: SolverBackend,
    pub tolerance: f64,
    /// `None` means `2 * unknowns + 1000`.
    pub max_iterations: Option<usize>,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            backend: SolverBackend::default(),
            tolerance: DEFAULT_FUSION_TOLERANCE,
            max_iterations: None,
        }
    }
}

impl FusionParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: SolverBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = Some(max_iter);
        self
    }

    pub fn sanitized(&self, diagnostics: &mut Diagnostics) -> Self {
        let mut p = *self;
        if !(p.tolerance.is_finite() && p.tolerance > 0.0) {
            diagnostics.warn(format!(
                "tolerance {} is invalid, using {DEFAULT_FUSION_TOLERANCE}",
                p.tolerance
            ));
            p.tolerance = DEFAULT_FUSION_TOLERANCE;
        }
        if p.max_iterations == Some(0) {
            diagnostics.warn("max_iterations is 0, using the automatic limit");
            p.max_iterations = None;
        }
        p
    }

    pub fn iteration_limit(&self, unknowns: usize) -> usize {
        self.max_iterations
            .unwrap_or_else(|| unknowns.saturating_mul(2).saturating_add(1000))
    }

    pub(crate) fn cg_solver(&self, unknowns: usize) -> CgSolver {
        CgSolver::new()
            .with_tolerance(self.tolerance)
            .with_max_iterations(self.iteration_limit(unknowns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = LabelMatchParams::default();
        assert_eq!(p.large_penalty, 1000.0);
        assert_eq!(p.smooth_alpha, 100.0);
        assert_eq!(p.smooth_mode, SmoothMode::Plain);
        assert_eq!(p.expansion_cycles, 2);
        assert_eq!(FusionParams::default().backend, SolverBackend::Custom);
    }

    #[test]
    fn invalid_label_params_are_replaced() {
        let mut diag = Diagnostics::new();
        let p = LabelMatchParams::new()
            .with_large_penalty(-5.0)
            .with_smooth_alpha(f64::NAN)
            .with_smooth_mode(SmoothMode::PlainDividedByEdge)
            .with_expansion_cycles(0)
            .sanitized(&mut diag);
        assert_eq!(p.large_penalty, DEFAULT_LARGE_PENALTY);
        assert_eq!(p.smooth_alpha, DEFAULT_EDGE_RATIO_ALPHA);
        assert_eq!(p.expansion_cycles, DEFAULT_EXPANSION_CYCLES);
        assert_eq!(diag.lines().len(), 3);
        assert!(diag.lines().iter().all(|l| l.starts_with("warning: ")));
    }

    #[test]
    fn valid_params_pass_through_silently() {
        let mut diag = Diagnostics::new();
        let p = LabelMatchParams::new().with_smooth_alpha(0.0).sanitized(&mut diag);
        assert_eq!(p.smooth_alpha, 0.0);
        assert!(diag.is_empty());
    }

    #[test]
    fn fusion_iteration_limit() {
        let mut diag = Diagnostics::new();
        let p = FusionParams::new()
            .with_max_iterations(0)
            .with_tolerance(0.0)
            .sanitized(&mut diag);
        assert_eq!(p.max_iterations, None);
        assert_eq!(p.tolerance, DEFAULT_FUSION_TOLERANCE);
        assert_eq!(p.iteration_limit(16), 1032);
        assert_eq!(FusionParams::new().with_max_iterations(7).iteration_limit(16), 7);
    }
}

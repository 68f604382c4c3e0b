use image::RgbImage;
use montage_core::{common_dimensions, Diagnostics, Error, LabelConstraint, LabelMap, Result};
use montage_optimize::{GridMrf, MoveReport};

use crate::energy::MontageEnergy;
use crate::params::{LabelMatchParams, SmoothMode};
use crate::visualize::{composite_image, fill_label_colors, label_color_map};

/// Output of one label-matching run.
#[derive(Debug, Clone)]
pub struct LabelMatchResult {
    pub label_map: LabelMap,
    /// Each label drawn in its visualization color.
    pub label_visual: RgbImage,
    /// Every pixel copied from the source its label selects.
    pub composite: RgbImage,
    pub label_colors: Vec<[u8; 3]>,
    pub energy_before: f64,
    pub energy_after: f64,
    pub report: MoveReport,
    pub diagnostics: Diagnostics,
}

/// Turns sparse per-pixel hints into a dense source assignment by graph-cut
/// energy minimization.
#[derive(Debug, Clone, Default)]
pub struct LabelMatcher {
    pub params: LabelMatchParams,
}

impl LabelMatcher {
    pub fn new(params: LabelMatchParams) -> Self {
        Self { params }
    }

    pub fn solve(&self, images: &[RgbImage], constraints: &LabelConstraint) -> Result<LabelMatchResult> {
        let mut diagnostics = Diagnostics::new();
        let params = self.params.sanitized(&mut diagnostics);

        let (width, height) = common_dimensions(images)?;
        if (constraints.width, constraints.height) != (width, height)
            || constraints.data.len() != width as usize * height as usize
        {
            return Err(Error::DimensionMismatch(format!(
                "constraints are {}x{}, images are {width}x{height}",
                constraints.width, constraints.height
            )));
        }
        if let Some(max) = constraints.max_label() {
            if max >= images.len() {
                return Err(Error::InvalidInput(format!(
                    "constraint refers to source {max} but only {} images were given",
                    images.len()
                )));
            }
        }

        let energy = MontageEnergy::new(images, constraints, &params);
        let mut mrf = GridMrf::new(width as usize, height as usize, &energy)?;

        let report = match params.smooth_mode {
            SmoothMode::PlainDividedByEdge => mrf.swap(2 * images.len())?,
            SmoothMode::Plain | SmoothMode::PlainPlusEdge6 => mrf.expansion(params.expansion_cycles)?,
        };

        diagnostics.info(format!("Before optimization energy is {}", report.energy_before));
        diagnostics.info(format!("After optimization energy is {}", report.energy_after));
        diagnostics.info(format!(
            "{:?} moves: {} accepted over {} cycles{}",
            report.kind,
            report.moves_accepted,
            report.cycles,
            if report.converged { "" } else { " (cycle budget exhausted)" }
        ));

        let label_map = LabelMap::from_vec(width, height, mrf.into_labels())?;
        let label_colors = fill_label_colors(&params.label_colors, images.len(), params.color_seed);
        let label_visual = label_color_map(&label_map, &label_colors)?;
        let composite = composite_image(images, &label_map)?;

        Ok(LabelMatchResult {
            label_map,
            label_visual,
            composite,
            label_colors,
            energy_before: report.energy_before,
            energy_after: report.energy_after,
            report,
            diagnostics,
        })
    }
}

use image::{GrayImage, RgbImage};
use montage_core::{common_dimensions, Error, LabelConstraint, Result};

use crate::fusion::{FusionResult, GradientFusion};
use crate::label_match::{LabelMatchResult, LabelMatcher};
use crate::params::{FusionParams, LabelMatchParams};

/// State of one compositing session: the sources, the user's masks and the
/// most recent label match.
///
/// Both stages borrow the session, and label matching needs `&mut self`, so
/// a session cannot run two stages at once.
#[derive(Debug, Clone)]
pub struct MontageSession {
    images: Vec<RgbImage>,
    masks: Vec<Option<GrayImage>>,
    label_colors: Vec<[u8; 3]>,
    label_result: Option<LabelMatchResult>,
    width: u32,
    height: u32,
}

impl MontageSession {
    pub fn new(images: Vec<RgbImage>) -> Result<Self> {
        let (width, height) = common_dimensions(&images)?;
        let masks = vec![None; images.len()];
        Ok(Self {
            images,
            masks,
            label_colors: Vec::new(),
            label_result: None,
            width,
            height,
        })
    }

    pub fn images(&self) -> &[RgbImage] {
        &self.images
    }

    pub fn num_images(&self) -> usize {
        self.images.len()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.images.len() {
            return Err(Error::InvalidInput(format!(
                "image index {index} out of range ({} images)",
                self.images.len()
            )));
        }
        Ok(())
    }

    /// Sets the painted mask for source `index`; non-zero pixels are marked.
    pub fn set_mask(&mut self, index: usize, mask: GrayImage) -> Result<()> {
        self.check_index(index)?;
        if mask.dimensions() != (self.width, self.height) {
            return Err(Error::DimensionMismatch(format!(
                "mask is {}x{}, images are {}x{}",
                mask.width(),
                mask.height(),
                self.width,
                self.height
            )));
        }
        self.masks[index] = Some(mask);
        Ok(())
    }

    pub fn clear_mask(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.masks[index] = None;
        Ok(())
    }

    pub fn clear_masks(&mut self) {
        self.masks.iter_mut().for_each(|m| *m = None);
    }

    pub fn set_label_colors(&mut self, colors: Vec<[u8; 3]>) {
        self.label_colors = colors;
    }

    /// Hints built from the current masks; a later mask wins where masks overlap.
    pub fn constraints(&self) -> Result<LabelConstraint> {
        LabelConstraint::from_masks(self.width, self.height, &self.masks)
    }

    /// Runs label matching and keeps the result for fusion. Colors set on the
    /// session are used unless `params` carries its own.
    pub fn run_label_match(&mut self, params: &LabelMatchParams) -> Result<&LabelMatchResult> {
        let constraints = self.constraints()?;
        let mut params = params.clone();
        if params.label_colors.is_empty() {
            params.label_colors = self.label_colors.clone();
        }
        let result = LabelMatcher::new(params).solve(&self.images, &constraints)?;
        let stored = self.label_result.insert(result);
        Ok(&*stored)
    }

    pub fn label_result(&self) -> Option<&LabelMatchResult> {
        self.label_result.as_ref()
    }

    /// Fuses the sources along the last label map.
    pub fn run_gradient_fusion(&self, params: &FusionParams) -> Result<FusionResult> {
        let result = self.label_result.as_ref().ok_or_else(|| {
            Error::InvalidState("gradient fusion needs a label match result; run label matching first".into())
        })?;
        GradientFusion::new(*params).solve(&self.images, &result.label_map)
    }
}

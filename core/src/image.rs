use image::{GrayImage, Luma, RgbImage};

use crate::{Error, Result};

/// Index of the source image a pixel is taken from.
pub type Label = usize;

pub fn validate_image_size(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::dimension_mismatch(
            "Image dimensions must be non-zero",
        ));
    }
    Ok(())
}

/// Checks that `images` is non-empty and that every image shares the first
/// image's dimensions. Returns `(width, height)`.
pub fn common_dimensions(images: &[RgbImage]) -> Result<(u32, u32)> {
    let first = images
        .first()
        .ok_or_else(|| Error::invalid_input("At least one source image is required"))?;
    let (width, height) = first.dimensions();
    validate_image_size(width, height)?;

    for (i, img) in images.iter().enumerate().skip(1) {
        if img.dimensions() != (width, height) {
            return Err(Error::DimensionMismatch(format!(
                "source image {i} is {}x{}, expected {width}x{height}",
                img.width(),
                img.height()
            )));
        }
    }
    Ok((width, height))
}

pub fn get_pixel_rgb(img: &RgbImage, x: u32, y: u32) -> [u8; 3] {
    img.get_pixel(x, y).0
}

/// Euclidean distance between two 8-bit RGB colors.
pub fn rgb_distance(a: [u8; 3], b: [u8; 3]) -> f64 {
    let dr = a[0] as f64 - b[0] as f64;
    let dg = a[1] as f64 - b[1] as f64;
    let db = a[2] as f64 - b[2] as f64;
    (dr * dr + dg * dg + db * db).sqrt()
}

/// Sparse user hints: `None` means the pixel is unconstrained.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelConstraint {
    pub data: Vec<Option<Label>>,
    pub width: u32,
    pub height: u32,
}

impl LabelConstraint {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![None; (width as usize) * (height as usize)],
            width,
            height,
        }
    }

    /// Builds the constraint grid from one optional mask per source image.
    ///
    /// Any non-zero mask pixel constrains that pixel to the mask's index.
    /// Masks are applied in index order, so a later mask overrides an earlier
    /// one where they overlap.
    pub fn from_masks(width: u32, height: u32, masks: &[Option<GrayImage>]) -> Result<Self> {
        validate_image_size(width, height)?;
        let mut constraint = Self::new(width, height);

        for (label, mask) in masks.iter().enumerate() {
            let Some(mask) = mask else { continue };
            if mask.dimensions() != (width, height) {
                return Err(Error::DimensionMismatch(format!(
                    "mask {label} is {}x{}, expected {width}x{height}",
                    mask.width(),
                    mask.height()
                )));
            }
            for (cell, px) in constraint.data.iter_mut().zip(mask.as_raw()) {
                if *px != 0 {
                    *cell = Some(label);
                }
            }
        }

        Ok(constraint)
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Label> {
        let idx = (y * self.width + x) as usize;
        self.data.get(idx).copied().flatten()
    }

    pub fn set(&mut self, x: u32, y: u32, label: Option<Label>) {
        let idx = (y * self.width + x) as usize;
        if let Some(cell) = self.data.get_mut(idx) {
            *cell = label;
        }
    }

    pub fn constrained_count(&self) -> usize {
        self.data.iter().filter(|c| c.is_some()).count()
    }

    /// Largest label referenced by any hint.
    pub fn max_label(&self) -> Option<Label> {
        self.data.iter().flatten().copied().max()
    }
}

/// Dense per-pixel assignment produced by label matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    pub data: Vec<Label>,
    pub width: u32,
    pub height: u32,
}

impl LabelMap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0; (width as usize) * (height as usize)],
            width,
            height,
        }
    }

    pub fn from_vec(width: u32, height: u32, data: Vec<Label>) -> Result<Self> {
        let expected = (width as usize) * (height as usize);
        if data.len() != expected {
            return Err(Error::DimensionMismatch(format!(
                "label buffer has {} entries, expected {expected}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn get(&self, x: u32, y: u32) -> Label {
        let idx = (y * self.width + x) as usize;
        self.data.get(idx).copied().unwrap_or(0)
    }

    pub fn set(&mut self, x: u32, y: u32, label: Label) {
        let idx = (y * self.width + x) as usize;
        if let Some(cell) = self.data.get_mut(idx) {
            *cell = label;
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn max_label(&self) -> Option<Label> {
        self.data.iter().copied().max()
    }

    /// Number of pixels assigned to each of `num_labels` labels.
    pub fn histogram(&self, num_labels: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_labels];
        for &l in &self.data {
            if let Some(c) = counts.get_mut(l) {
                *c += 1;
            }
        }
        counts
    }

    /// Gray index image; labels above 255 saturate.
    pub fn to_image(&self) -> GrayImage {
        let mut img = GrayImage::new(self.width, self.height);
        for (px, &label) in img.pixels_mut().zip(&self.data) {
            *px = Luma([label.min(255) as u8]);
        }
        img
    }
}

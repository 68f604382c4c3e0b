//! Gradient-domain fusion.
//!
//! Each pixel's horizontal and vertical color differences are read from the
//! source its label selects, and one least-squares system per channel
//! rebuilds an image with those gradients. Pixel (0, 0) is pinned to the mean
//! of the sources there. Rows of the system:
//!
//! - `2 i`: `x[i + 1] - x[i] = gx(i)` when pixel `i` has a right neighbour
//! - `2 i + 1`: `x[i + w] - x[i] = gy(i)` when pixel `i` has a lower neighbour
//! - `2 w h`: `x[0] = anchor`
//!
//! The coefficient matrix is channel independent and is prepared once.

use image::RgbImage;
use montage_core::{common_dimensions, Diagnostics, Error, LabelMap, Result};
use montage_optimize::{LeastSquaresSystem, PreparedSystem};
use nalgebra::DVector;
use rayon::prelude::*;

use crate::params::FusionParams;

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReport {
    pub converged: bool,
    pub iterations: usize,
    pub residual_norm: f64,
    /// Target value of the pinned pixel.
    pub anchor_target: f64,
    /// Solved value minus target at the pinned pixel.
    pub anchor_residual: f64,
}

#[derive(Debug, Clone)]
pub struct FusionResult {
    pub image: RgbImage,
    pub channels: [ChannelReport; 3],
    pub diagnostics: Diagnostics,
}

impl FusionResult {
    pub fn converged(&self) -> bool {
        self.channels.iter().all(|c| c.converged)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GradientFusion {
    pub params: FusionParams,
}

/// Per-pixel differences to the right and downward neighbour, sampled from
/// the labelled source. Zero where the neighbour does not exist.
fn sample_gradients(images: &[RgbImage], labels: &LabelMap) -> (Vec<[f64; 3]>, Vec<[f64; 3]>) {
    let (w, h) = (labels.width as usize, labels.height as usize);
    (0..w * h)
        .into_par_iter()
        .map(|i| {
            let (x, y) = (i % w, i / w);
            let src = images[labels.data[i]].as_raw();
            let at = |j: usize, c: usize| src[j * 3 + c] as f64;
            let mut gx = [0.0; 3];
            let mut gy = [0.0; 3];
            for c in 0..3 {
                if x + 1 < w {
                    gx[c] = at(i + 1, c) - at(i, c);
                }
                if y + 1 < h {
                    gy[c] = at(i + w, c) - at(i, c);
                }
            }
            (gx, gy)
        })
        .unzip()
}

fn anchor_targets(images: &[RgbImage]) -> [f64; 3] {
    let mut sum = [0.0f64; 3];
    for img in images {
        let raw = img.as_raw();
        for c in 0..3 {
            sum[c] += raw[c] as f64;
        }
    }
    sum.map(|s| (s / images.len() as f64).clamp(0.0, 255.0))
}

fn build_system(w: usize, h: usize) -> Result<LeastSquaresSystem> {
    let n = w
        .checked_mul(h)
        .ok_or_else(|| Error::allocation(format!("image {w}x{h} is too large")))?;
    let rows = n
        .checked_mul(2)
        .and_then(|r| r.checked_add(1))
        .ok_or_else(|| Error::allocation(format!("image {w}x{h} is too large")))?;
    let mut system = LeastSquaresSystem::with_capacity(rows, n, n.saturating_mul(4).saturating_add(1))?;
    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            if x + 1 < w {
                system.add(2 * i, i, -1.0);
                system.add(2 * i, i + 1, 1.0);
            }
            if y + 1 < h {
                system.add(2 * i + 1, i, -1.0);
                system.add(2 * i + 1, i + w, 1.0);
            }
        }
    }
    system.add(2 * n, 0, 1.0);
    Ok(system)
}

impl GradientFusion {
    pub fn new(params: FusionParams) -> Self {
        Self { params }
    }

    pub fn solve(&self, images: &[RgbImage], labels: &LabelMap) -> Result<FusionResult> {
        let mut diagnostics = Diagnostics::new();
        let params = self.params.sanitized(&mut diagnostics);

        let (width, height) = common_dimensions(images)?;
        if labels.dimensions() != (width, height) || labels.data.len() != width as usize * height as usize {
            return Err(Error::DimensionMismatch(format!(
                "label map is {}x{}, images are {width}x{height}",
                labels.width, labels.height
            )));
        }
        if let Some(max) = labels.max_label() {
            if max >= images.len() {
                return Err(Error::InvalidInput(format!(
                    "label {max} refers to a missing source image ({} given)",
                    images.len()
                )));
            }
        }

        let (w, h) = (width as usize, height as usize);
        let n = w * h;
        let (gx, gy) = sample_gradients(images, labels);
        let targets = anchor_targets(images);

        let system = build_system(w, h)?;
        let backend = params.backend.instantiate(params.cg_solver(n));
        let prepared: Box<dyn PreparedSystem> = backend.prepare(&system)?;
        tracing::info!(
            backend = backend.name(),
            unknowns = n,
            equations = system.rows,
            "prepared gradient fusion system"
        );

        let solves = (0..3)
            .into_par_iter()
            .map(|c| {
                let mut rhs = DVector::zeros(system.rows);
                for i in 0..n {
                    rhs[2 * i] = gx[i][c];
                    rhs[2 * i + 1] = gy[i][c];
                }
                rhs[2 * n] = targets[c];
                let guess = DVector::from_element(n, targets[c]);
                prepared.solve(&rhs, &guess)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut image = RgbImage::new(width, height);
        let mut reports = Vec::with_capacity(3);
        for (c, solve) in solves.iter().enumerate() {
            write_channel(&mut image, c, &solve.x)?;

            let anchor_residual = solve.x[0] - targets[c];
            if solve.converged {
                diagnostics.info(format!(
                    "channel {c}: converged after {} iterations, residual {:.3e}",
                    solve.iterations, solve.residual_norm
                ));
            } else {
                diagnostics.warn(format!(
                    "channel {c}: did not converge within {} iterations, residual {:.3e}",
                    solve.iterations, solve.residual_norm
                ));
            }
            diagnostics.info(format!(
                "channel {c}: anchor residual {anchor_residual:.6} (target {:.3})",
                targets[c]
            ));

            reports.push(ChannelReport {
                converged: solve.converged,
                iterations: solve.iterations,
                residual_norm: solve.residual_norm,
                anchor_target: targets[c],
                anchor_residual,
            });
        }

        let channels: [ChannelReport; 3] = reports
            .try_into()
            .map_err(|_| Error::InvalidState("expected three channel solves".into()))?;

        Ok(FusionResult {
            image,
            channels,
            diagnostics,
        })
    }
}

/// Writes one solved channel into `image`, rounding and clamping to 8 bits.
pub fn write_channel(image: &mut RgbImage, channel: usize, values: &DVector<f64>) -> Result<()> {
    if channel >= 3 || values.len() != image.width() as usize * image.height() as usize {
        return Err(Error::DimensionMismatch(format!(
            "cannot write channel {channel} of {} values into {}x{} image",
            values.len(),
            image.width(),
            image.height()
        )));
    }
    for (px, v) in image.pixels_mut().zip(values.iter()) {
        px.0[channel] = v.round().clamp(0.0, 255.0) as u8;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use montage_optimize::SolverBackend;

    fn gradient_image(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 20 + y * 5) as u8, (y * 30) as u8, 200 - (x * y) as u8]))
    }

    #[test]
    fn system_shape() {
        let sys = build_system(3, 2).unwrap();
        assert_eq!(sys.rows, 13);
        assert_eq!(sys.cols, 6);
        // 2 horizontal pairs per row, 3 vertical pairs, one anchor
        assert_eq!(sys.triplets().len(), 2 * (4 + 3) + 1);
    }

    #[test]
    fn anchor_is_mean_of_sources() {
        let a = RgbImage::from_pixel(1, 1, Rgb([10, 20, 255]));
        let b = RgbImage::from_pixel(1, 1, Rgb([20, 21, 255]));
        assert_eq!(anchor_targets(&[a, b]), [15.0, 20.5, 255.0]);
    }

    #[test]
    fn single_source_is_reproduced() {
        let img = gradient_image(5, 4);
        let labels = LabelMap::new(5, 4);
        for backend in [SolverBackend::Custom, SolverBackend::Reference] {
            let out = GradientFusion::new(FusionParams::new().with_backend(backend))
                .solve(std::slice::from_ref(&img), &labels)
                .unwrap();
            assert_eq!(out.image, img, "backend {backend:?}");
            assert!(out.converged());
            assert!(out.channels.iter().all(|c| c.anchor_residual.abs() < 1e-3));
        }
    }

    #[test]
    fn write_channel_rounds_and_clamps() {
        let mut img = RgbImage::new(3, 1);
        write_channel(&mut img, 1, &DVector::from_vec(vec![-4.0, 127.5, 300.0])).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(img.get_pixel(1, 0).0, [0, 128, 0]);
        assert_eq!(img.get_pixel(2, 0).0, [0, 255, 0]);
        assert!(write_channel(&mut img, 3, &DVector::zeros(3)).is_err());
    }
}

use image::{GrayImage, RgbImage};
use rayon::prelude::*;

use crate::{Error, Result};

const SOBEL_DERIV: [f32; 3] = [-1.0, 0.0, 1.0];
const SOBEL_SMOOTH: [f32; 3] = [1.0, 2.0, 1.0];

/// Signed horizontal/vertical derivatives of a `C`-channel image, one
/// `[f32; C]` per pixel in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientField<const C: usize> {
    pub width: u32,
    pub height: u32,
    pub gx: Vec<[f32; C]>,
    pub gy: Vec<[f32; C]>,
}

pub type GrayGradient = GradientField<1>;
pub type ColorGradient = GradientField<3>;

impl<const C: usize> GradientField<C> {
    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    pub fn gx_at(&self, x: u32, y: u32) -> [f32; C] {
        self.gx[self.index(x, y)]
    }

    pub fn gy_at(&self, x: u32, y: u32) -> [f32; C] {
        self.gy[self.index(x, y)]
    }

    /// Per-pixel L2 norm of `(gx, gy)` over all channels.
    pub fn magnitude(&self) -> Vec<f32> {
        self.gx
            .par_iter()
            .zip(self.gy.par_iter())
            .map(|(gx, gy)| {
                gx.iter()
                    .zip(gy.iter())
                    .map(|(a, b)| a * a + b * b)
                    .sum::<f32>()
                    .sqrt()
            })
            .collect()
    }
}

/// 3x3 Sobel on a gray image with replicated borders.
pub fn sobel_gradient_gray(src: &GrayImage) -> GrayGradient {
    sobel_interleaved::<1>(src.as_raw(), src.width(), src.height())
}

/// 3x3 Sobel applied to each RGB channel independently, replicated borders.
pub fn sobel_gradient_rgb(src: &RgbImage) -> ColorGradient {
    sobel_interleaved::<3>(src.as_raw(), src.width(), src.height())
}

/// Checked variant for callers holding a raw interleaved buffer.
pub fn sobel_gradient_raw<const C: usize>(
    data: &[u8],
    width: u32,
    height: u32,
) -> Result<GradientField<C>> {
    let expected = width as usize * height as usize * C;
    if data.len() != expected {
        return Err(Error::DimensionMismatch(format!(
            "buffer has {} bytes, expected {expected} for {width}x{height}x{C}",
            data.len()
        )));
    }
    Ok(sobel_interleaved::<C>(data, width, height))
}

fn sobel_interleaved<const C: usize>(data: &[u8], width: u32, height: u32) -> GradientField<C> {
    let w = width as usize;
    let h = height as usize;
    let mut gx = vec![[0.0f32; C]; w * h];
    let mut gy = vec![[0.0f32; C]; w * h];

    if w == 0 || h == 0 {
        return GradientField { width, height, gx, gy };
    }

    let sample = |x: isize, y: isize, c: usize| -> f32 {
        let cx = x.clamp(0, w as isize - 1) as usize;
        let cy = y.clamp(0, h as isize - 1) as usize;
        data[(cy * w + cx) * C + c] as f32
    };

    gx.par_chunks_mut(w)
        .zip(gy.par_chunks_mut(w))
        .enumerate()
        .for_each(|(y, (gx_row, gy_row))| {
            for x in 0..w {
                let mut dx = [0.0f32; C];
                let mut dy = [0.0f32; C];
                for (ky, (&deriv_y, &smooth_y)) in SOBEL_DERIV.iter().zip(&SOBEL_SMOOTH).enumerate() {
                    let sy = y as isize + ky as isize - 1;
                    for (kx, (&deriv_x, &smooth_x)) in SOBEL_DERIV.iter().zip(&SOBEL_SMOOTH).enumerate() {
                        let sx = x as isize + kx as isize - 1;
                        for c in 0..C {
                            let v = sample(sx, sy, c);
                            dx[c] += deriv_x * smooth_y * v;
                            dy[c] += smooth_x * deriv_y * v;
                        }
                    }
                }
                gx_row[x] = dx;
                gy_row[x] = dy;
            }
        });

    GradientField { width, height, gx, gy }
}

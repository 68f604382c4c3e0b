use image::RgbImage;
use montage_core::{rgb_distance, Label, LabelConstraint};
use montage_imgproc::{sobel_gradient_gray, sobel_gradient_rgb, to_gray, ColorGradient, GrayGradient};
use montage_optimize::MrfEnergy;
use rayon::prelude::*;

use crate::params::{LabelMatchParams, SmoothMode};

/// Costs of one label-matching run: source images, user hints and the
/// (already sanitized) parameters, plus whatever gradients the smoothness
/// mode needs.
pub struct MontageEnergy<'a> {
    images: &'a [RgbImage],
    constraints: &'a LabelConstraint,
    width: usize,
    large_penalty: f64,
    smooth_alpha: f64,
    mode: SmoothMode,
    color_gradients: Vec<ColorGradient>,
    gray_gradients: Vec<GrayGradient>,
}

impl<'a> MontageEnergy<'a> {
    /// Expects `images` and `constraints` to share one size.
    pub fn new(images: &'a [RgbImage], constraints: &'a LabelConstraint, params: &LabelMatchParams) -> Self {
        let color_gradients = match params.smooth_mode {
            SmoothMode::PlainPlusEdge6 => images.par_iter().map(sobel_gradient_rgb).collect(),
            _ => Vec::new(),
        };
        let gray_gradients = match params.smooth_mode {
            SmoothMode::PlainDividedByEdge => images
                .par_iter()
                .map(|img| sobel_gradient_gray(&to_gray(img)))
                .collect(),
            _ => Vec::new(),
        };

        Self {
            images,
            constraints,
            width: constraints.width as usize,
            large_penalty: params.large_penalty,
            smooth_alpha: params.smooth_alpha,
            mode: params.smooth_mode,
            color_gradients,
            gray_gradients,
        }
    }

    pub fn mode(&self) -> SmoothMode {
        self.mode
    }

    fn color(&self, label: Label, pixel: usize) -> [u8; 3] {
        let raw = self.images[label].as_raw();
        let i = pixel * 3;
        [raw[i], raw[i + 1], raw[i + 2]]
    }

    fn color_term(&self, p: usize, q: usize, lp: Label, lq: Label) -> f64 {
        let at_p = rgb_distance(self.color(lp, p), self.color(lq, p));
        let at_q = rgb_distance(self.color(lp, q), self.color(lq, q));
        self.smooth_alpha * (at_p + at_q)
    }

    fn gradient_term(&self, p: usize, q: usize, lp: Label, lq: Label) -> f64 {
        let (a, b) = (&self.color_gradients[lp], &self.color_gradients[lq]);
        [p, q]
            .iter()
            .map(|&px| vec_distance(&a.gx[px], &b.gx[px]) + vec_distance(&a.gy[px], &b.gy[px]))
            .sum()
    }

    /// Gray edge strength across the seam: vertical gradients for a
    /// horizontal neighbour pair, horizontal gradients otherwise.
    fn edge_strength(&self, p: usize, q: usize, lp: Label, lq: Label) -> f64 {
        let horizontal = p / self.width == q / self.width;
        [lp, lq]
            .iter()
            .map(|&l| {
                let g = &self.gray_gradients[l];
                let field = if horizontal { &g.gy } else { &g.gx };
                (field[p][0].abs() + field[q][0].abs()) as f64
            })
            .sum()
    }
}

fn vec_distance(a: &[f32; 3], b: &[f32; 3]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = (*x - *y) as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

impl MrfEnergy for MontageEnergy<'_> {
    fn num_labels(&self) -> usize {
        self.images.len()
    }

    /// Zero for the hinted label, `large_penalty` otherwise. Unconstrained
    /// pixels pay `large_penalty` for every label, which leaves their choice
    /// to the smoothness term.
    fn data_cost(&self, pixel: usize, label: Label) -> f64 {
        match self.constraints.data[pixel] {
            Some(hint) if hint == label => 0.0,
            _ => self.large_penalty,
        }
    }

    fn smooth_cost(&self, p: usize, q: usize, lp: Label, lq: Label) -> f64 {
        if lp == lq {
            return 0.0;
        }
        let x = self.color_term(p, q, lp, lq);
        match self.mode {
            SmoothMode::Plain => x,
            SmoothMode::PlainPlusEdge6 => x + self.gradient_term(p, q, lp, lq),
            SmoothMode::PlainDividedByEdge => {
                let ratio = x / self.edge_strength(p, q, lp, lq);
                if ratio.is_finite() && ratio <= self.large_penalty {
                    ratio
                } else {
                    self.large_penalty
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(w: u32, h: u32, c: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb(c))
    }

    #[test]
    fn data_cost_follows_hints() {
        let images = vec![solid(2, 1, [0, 0, 0]), solid(2, 1, [9, 9, 9])];
        let mut constraints = LabelConstraint::new(2, 1);
        constraints.set(0, 0, Some(1));
        let params = LabelMatchParams::new().with_large_penalty(50.0);
        let e = MontageEnergy::new(&images, &constraints, &params);

        assert_eq!(e.data_cost(0, 1), 0.0);
        assert_eq!(e.data_cost(0, 0), 50.0);
        assert_eq!(e.data_cost(1, 0), 50.0);
        assert_eq!(e.data_cost(1, 1), 50.0);
    }

    #[test]
    fn plain_cost_is_scaled_color_distance() {
        let images = vec![solid(2, 1, [0, 0, 0]), solid(2, 1, [3, 4, 0])];
        let constraints = LabelConstraint::new(2, 1);
        let params = LabelMatchParams::new().with_smooth_alpha(2.0);
        let e = MontageEnergy::new(&images, &constraints, &params);

        // 2 * (5 + 5)
        assert_eq!(e.smooth_cost(0, 1, 0, 1), 20.0);
        assert_eq!(e.smooth_cost(0, 1, 1, 0), 20.0);
        assert_eq!(e.smooth_cost(0, 1, 1, 1), 0.0);
    }

    #[test]
    fn edge6_adds_gradient_difference() {
        let mut ramp = RgbImage::new(4, 3);
        for y in 0..3 {
            for x in 0..4 {
                ramp.put_pixel(x, y, Rgb([(x * 10) as u8, 0, 0]));
            }
        }
        let flat = solid(4, 3, [0, 0, 0]);
        let images = vec![ramp, flat];
        let constraints = LabelConstraint::new(4, 3);
        let params = LabelMatchParams::new()
            .with_smooth_alpha(0.0)
            .with_smooth_mode(SmoothMode::PlainPlusEdge6);
        let e = MontageEnergy::new(&images, &constraints, &params);

        // interior pixels (1,1) and (2,1): red gx = 80 in the ramp, 0 in the flat image
        let p = 4 + 1;
        let q = 4 + 2;
        assert_eq!(e.smooth_cost(p, q, 0, 1), 160.0);
    }

    #[test]
    fn divided_by_edge_clamps_flat_regions() {
        let images = vec![solid(3, 3, [10, 10, 10]), solid(3, 3, [200, 200, 200])];
        let constraints = LabelConstraint::new(3, 3);
        let params = LabelMatchParams::new()
            .with_large_penalty(77.0)
            .with_smooth_alpha(1.0)
            .with_smooth_mode(SmoothMode::PlainDividedByEdge);
        let e = MontageEnergy::new(&images, &constraints, &params);
        // no edges anywhere: x / 0 is infinite
        assert_eq!(e.smooth_cost(4, 5, 0, 1), 77.0);
        assert_eq!(e.smooth_cost(4, 7, 1, 0), 77.0);
    }

    #[test]
    fn divided_by_edge_uses_cross_seam_gradient() {
        // horizontal stripes: strong vertical gradient along row 1
        let mut striped = RgbImage::new(3, 3);
        for y in 0..3 {
            for x in 0..3 {
                let v = if y == 0 { 0 } else { 100 };
                striped.put_pixel(x, y, Rgb([v, v, v]));
            }
        }
        let images = vec![striped.clone(), striped];
        let constraints = LabelConstraint::new(3, 3);
        let params = LabelMatchParams::new()
            .with_large_penalty(1e9)
            .with_smooth_mode(SmoothMode::PlainDividedByEdge);
        let e = MontageEnergy::new(&images, &constraints, &params);
        // identical sources: zero color difference over a non-zero edge
        assert_eq!(e.smooth_cost(3, 4, 0, 1), 0.0);
    }
}

use image::{Rgb, RgbImage};
use montage_core::{Error, LabelMap, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Colors for `num_labels` labels: `given` first, the rest drawn from a
/// `StdRng` (seeded when `seed` is set, from OS entropy otherwise).
pub fn fill_label_colors(given: &[[u8; 3]], num_labels: usize, seed: Option<u64>) -> Vec<[u8; 3]> {
    let mut colors: Vec<[u8; 3]> = given.iter().take(num_labels).copied().collect();
    if colors.len() < num_labels {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        while colors.len() < num_labels {
            colors.push([rng.gen(), rng.gen(), rng.gen()]);
        }
    }
    colors
}

/// Renders each label in its color.
pub fn label_color_map(labels: &LabelMap, colors: &[[u8; 3]]) -> Result<RgbImage> {
    if let Some(max) = labels.max_label() {
        if max >= colors.len() {
            return Err(Error::InvalidInput(format!(
                "label {max} has no color ({} given)",
                colors.len()
            )));
        }
    }
    let mut out = RgbImage::new(labels.width, labels.height);
    for (px, &l) in out.pixels_mut().zip(&labels.data) {
        *px = Rgb(colors[l]);
    }
    Ok(out)
}

/// `out[p] = images[labels[p]][p]`.
pub fn composite_image(images: &[RgbImage], labels: &LabelMap) -> Result<RgbImage> {
    let (w, h) = labels.dimensions();
    if let Some(bad) = images.iter().position(|img| img.dimensions() != (w, h)) {
        return Err(Error::DimensionMismatch(format!(
            "source image {bad} does not match the {w}x{h} label map"
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

    let mut out = RgbImage::new(w, h);
    for (i, px) in out.pixels_mut().enumerate() {
        let src = images[labels.data[i]].as_raw();
        *px = Rgb([src[i * 3], src[i * 3 + 1], src[i * 3 + 2]]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_colors_are_reproducible() {
        let a = fill_label_colors(&[[1, 2, 3]], 4, Some(9));
        let b = fill_label_colors(&[[1, 2, 3]], 4, Some(9));
        assert_eq!(a.len(), 4);
        assert_eq!(a[0], [1, 2, 3]);
        assert_eq!(a, b);
        assert_eq!(fill_label_colors(&[[1, 1, 1], [2, 2, 2]], 1, None), vec![[1, 1, 1]]);
    }

    #[test]
    fn composite_picks_per_pixel_source() {
        let red = RgbImage::from_pixel(2, 1, Rgb([255, 0, 0]));
        let blue = RgbImage::from_pixel(2, 1, Rgb([0, 0, 255]));
        let labels = LabelMap::from_vec(2, 1, vec![1, 0]).unwrap();
        let out = composite_image(&[red, blue], &labels).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 255]);
        assert_eq!(out.get_pixel(1, 0).0, [255, 0, 0]);
    }

    #[test]
    fn color_map_needs_enough_colors() {
        let labels = LabelMap::from_vec(2, 1, vec![0, 2]).unwrap();
        assert!(label_color_map(&labels, &[[0, 0, 0], [1, 1, 1]]).is_err());
        let map = label_color_map(&labels, &[[0, 0, 0], [1, 1, 1], [5, 6, 7]]).unwrap();
        assert_eq!(map.get_pixel(1, 0).0, [5, 6, 7]);
    }
}

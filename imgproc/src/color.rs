use image::{GrayImage, RgbImage};
use rayon::prelude::*;
use rayon::ThreadPool;

// ITU-R BT.601 weights, scaled by 1000.
const LUMA_R: u32 = 299;
const LUMA_G: u32 = 587;
const LUMA_B: u32 = 114;

pub fn convert_rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    convert_rgb_to_gray_in_pool(rgb, None)
}

pub fn convert_rgb_to_gray_in_pool(rgb: &RgbImage, pool: Option<&ThreadPool>) -> GrayImage {
    let run = || {
        let (w, h) = rgb.dimensions();
        let mut gray = GrayImage::new(w, h);

        gray.as_mut()
            .par_iter_mut()
            .zip(rgb.as_raw().par_chunks_exact(3))
            .for_each(|(g, px)| {
                let v = LUMA_R * px[0] as u32 + LUMA_G * px[1] as u32 + LUMA_B * px[2] as u32;
                *g = (v / 1000) as u8;
            });

        gray
    };

    if let Some(p) = pool {
        p.install(run)
    } else {
        run()
    }
}

pub fn to_gray(img: &RgbImage) -> GrayImage {
    convert_rgb_to_gray(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn luma_weights() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, Rgb([100, 150, 200]));
        rgb.put_pixel(1, 0, Rgb([255, 255, 255]));
        let gray = to_gray(&rgb);
        // 0.299*100 + 0.587*150 + 0.114*200 = 140.75
        assert_eq!(gray.get_pixel(0, 0)[0], 140);
        assert_eq!(gray.get_pixel(1, 0)[0], 255);
    }
}

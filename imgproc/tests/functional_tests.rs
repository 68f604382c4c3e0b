use image::{Rgb, RgbImage};
use montage_imgproc::*;
use rayon::ThreadPoolBuilder;

#[test]
fn test_gray_conversion_in_custom_pool() {
    let pool = ThreadPoolBuilder::new().num_threads(1).build().unwrap();

    let mut rgb = RgbImage::new(100, 100);
    for p in rgb.pixels_mut() {
        *p = Rgb([100, 150, 200]);
    }

    let gray = convert_rgb_to_gray_in_pool(&rgb, Some(&pool));
    assert_eq!(gray.width(), 100);
    assert_eq!(gray.get_pixel(99, 99)[0], 140);
}

#[test]
fn test_gray_and_color_sobel_agree_on_gray_input() {
    let mut rgb = RgbImage::new(8, 8);
    for y in 0..8 {
        for x in 0..8 {
            let v = ((x * 7 + y * 13) % 256) as u8;
            rgb.put_pixel(x, y, Rgb([v, v, v]));
        }
    }

    let color = sobel_gradient_rgb(&rgb);
    let gray = sobel_gradient_gray(&to_gray(&rgb));

    for (c, g) in color.gx.iter().zip(gray.gx.iter()) {
        assert_eq!(c[0], g[0]);
        assert_eq!(c[1], c[2]);
    }
    for (c, g) in color.gy.iter().zip(gray.gy.iter()) {
        assert_eq!(c[2], g[0]);
    }
}

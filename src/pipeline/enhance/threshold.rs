//! Locally adaptive binarisation against a Gaussian-weighted neighbourhood mean.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::separable_filter_equal;

/// Binarise `img`: a pixel becomes 255 when it is brighter than the
/// Gaussian-weighted mean of its `block × block` neighbourhood minus
/// `offset`, and 0 otherwise.
///
/// Borders replicate the edge pixels.
pub fn adaptive_gaussian_threshold(img: &GrayImage, block: u32, offset: i32) -> GrayImage {
    let (w, h) = img.dimensions();
    let mean = gaussian_mean(img, block);
    let mut out = GrayImage::new(w, h);
    for ((dst, src), m) in out.iter_mut().zip(img.as_raw()).zip(mean.iter()) {
        *dst = if (*src as i32) > (*m as i32) - offset {
            255
        } else {
            0
        };
    }
    out
}

/// Normalised 1-D Gaussian kernel; sigma is derived from the size.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as i32;
    let scale = -0.5 / (sigma * sigma);
    let raw: Vec<f32> = (-half..=half)
        .map(|i| ((i * i) as f32 * scale).exp())
        .collect();
    let sum: f32 = raw.iter().sum();
    raw.into_iter().map(|v| v / sum).collect()
}

/// Separable Gaussian blur, rounded to 8 bits. imageproc clamps reads at the
/// image edge, which replicates the border pixels.
fn gaussian_mean(img: &GrayImage, block: u32) -> Vec<u8> {
    let kernel = gaussian_kernel(block);
    let as_float: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
            Luma([img.get_pixel(x, y)[0] as f32])
        });
    let blurred = separable_filter_equal(&as_float, &kernel);
    blurred
        .pixels()
        .map(|p| p[0].round().clamp(0.0, 255.0) as u8)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_is_normalised_and_symmetric() {
        let k = gaussian_kernel(11);
        assert_eq!(k.len(), 11);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!((k[0] - k[10]).abs() < 1e-7);
        assert!(k[5] > k[4]);
    }

    #[test]
    fn mean_replicates_borders() {
        // A bright right edge: replicated border keeps the corner bright,
        // while the far left stays at the dark level.
        let img = GrayImage::from_fn(20, 9, |x, _| Luma([if x >= 18 { 200 } else { 10 }]));
        let mean = gaussian_mean(&img, 11);
        assert_eq!(mean.len(), 20 * 9);
        assert_eq!(mean[0], 10);
        assert!(mean[19] > 100, "got {}", mean[19]);
    }

    #[test]
    fn mean_of_flat_image_is_unchanged() {
        let img = GrayImage::from_pixel(7, 5, Luma([123]));
        assert!(gaussian_mean(&img, 11).iter().all(|&v| v == 123));
    }

    #[test]
    fn output_is_binary() {
        let img = GrayImage::from_fn(25, 17, |x, y| Luma([((x * 13 + y * 29) % 256) as u8]));
        let out = adaptive_gaussian_threshold(&img, 11, 2);
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn flat_region_turns_white() {
        // src == mean, and src > mean - 2.
        let img = GrayImage::from_pixel(16, 16, Luma([90]));
        let out = adaptive_gaussian_threshold(&img, 11, 2);
        assert!(out.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn thin_dark_stroke_turns_black() {
        let mut img = GrayImage::from_pixel(30, 30, Luma([230]));
        for y in 5..25 {
            img.put_pixel(15, y, Luma([40]));
        }
        let out = adaptive_gaussian_threshold(&img, 11, 2);
        assert_eq!(out.get_pixel(15, 15).0[0], 0);
        assert_eq!(out.get_pixel(3, 15).0[0], 255);
    }
}

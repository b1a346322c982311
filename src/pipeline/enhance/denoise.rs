//! Non-local means denoising for 8-bit grayscale images.
//!
//! Every output pixel is a weighted average of the pixels in a square search
//! window around it. A candidate's weight depends on how similar the patch
//! (template) around it is to the patch around the pixel being filtered, so
//! structure repeated across the page (strokes of the same font) reinforces
//! itself while isolated specks average away.
//!
//! Patch distances for one displacement are computed for the whole image at
//! once with an integral image of squared differences, which makes the cost
//! independent of the template size.

use super::clahe::reflect101;
use image::GrayImage;

/// Weights below this are treated as zero.
const WEIGHT_THRESHOLD: f32 = 0.001;

/// Denoise with filter strength `h`, a `template × template` patch and a
/// `search × search` window. Both sizes are expected to be odd.
pub fn non_local_means(img: &GrayImage, h: f32, template: u32, search: u32) -> GrayImage {
    let (w, ht) = img.dimensions();
    if w == 0 || ht == 0 || h <= 0.0 {
        return img.clone();
    }
    let (w, ht) = (w as usize, ht as usize);
    let tr = (template / 2) as usize;
    let sr = (search / 2) as usize;
    let pad = tr + sr;

    let padded = pad_reflect(img, pad);
    let pw = w + 2 * pad;
    let lut = weight_lut(h);

    let k = 2 * tr + 1;
    let area = (k * k) as u64;
    // Squared differences are needed over the template-expanded image only.
    let rw = w + 2 * tr;
    let rh = ht + 2 * tr;
    let iw = rw + 1;
    let mut integral = vec![0u64; iw * (rh + 1)];

    let mut sum_w = vec![0f32; w * ht];
    let mut sum_wv = vec![0f32; w * ht];
    let sr_i = sr as isize;

    for dy in -sr_i..=sr_i {
        for dx in -sr_i..=sr_i {
            for j in 0..rh {
                let ay = sr + j;
                let by = (ay as isize + dy) as usize;
                let mut row = 0u64;
                for i in 0..rw {
                    let ax = sr + i;
                    let bx = (ax as isize + dx) as usize;
                    let d = padded[ay * pw + ax] as i32 - padded[by * pw + bx] as i32;
                    row += (d * d) as u64;
                    integral[(j + 1) * iw + i + 1] = integral[j * iw + i + 1] + row;
                }
            }

            for y in 0..ht {
                let ny = (y as isize + pad as isize + dy) as usize;
                for x in 0..w {
                    let ssd = integral[(y + k) * iw + x + k] + integral[y * iw + x]
                        - integral[y * iw + x + k]
                        - integral[(y + k) * iw + x];
                    let weight = lut[(ssd / area) as usize];
                    if weight > 0.0 {
                        let nx = (x as isize + pad as isize + dx) as usize;
                        let idx = y * w + x;
                        sum_w[idx] += weight;
                        sum_wv[idx] += weight * padded[ny * pw + nx] as f32;
                    }
                }
            }
        }
    }

    let src = img.as_raw();
    let mut out = GrayImage::new(w as u32, ht as u32);
    for (idx, px) in out.iter_mut().enumerate() {
        // The zero displacement always contributes weight 1.
        *px = if sum_w[idx] > 0.0 {
            (sum_wv[idx] / sum_w[idx]).round().clamp(0.0, 255.0) as u8
        } else {
            src[idx]
        };
    }
    out
}

/// Weight for every possible mean squared patch distance (0..=255²).
fn weight_lut(h: f32) -> Vec<f32> {
    let h2 = h * h;
    (0..=255u32 * 255)
        .map(|d| {
            let w = (-(d as f32) / h2).exp();
            if w < WEIGHT_THRESHOLD {
                0.0
            } else {
                w
            }
        })
        .collect()
}

fn pad_reflect(img: &GrayImage, pad: usize) -> Vec<u8> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let pw = w + 2 * pad;
    let ph = h + 2 * pad;
    let src = img.as_raw();
    let mut out = vec![0u8; pw * ph];
    for py in 0..ph {
        let sy = reflect101(py as isize - pad as isize, h);
        for px in 0..pw {
            let sx = reflect101(px as isize - pad as isize, w);
            out[py * pw + px] = src[sy * w + sx];
        }
    }
    out
}

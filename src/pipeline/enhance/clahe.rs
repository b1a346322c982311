//! Contrast-limited adaptive histogram equalisation.
//!
//! The image is split into a `tiles × tiles` grid. Each tile gets its own
//! equalisation LUT built from a clipped histogram; the clipped mass is
//! spread evenly over all bins so noise in flat regions is not blown up.
//! Output pixels blend the LUTs of the four nearest tile centres bilinearly,
//! which removes the block seams a per-tile mapping would leave.
//!
//! When the image size is not a multiple of the grid, tiles are sized by
//! rounding up and the missing border is read by reflection.

use image::GrayImage;

/// Apply CLAHE with the given clip limit and tile grid.
///
/// A non-positive `clip_limit` disables clipping (plain tiled equalisation).
pub fn clahe(img: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 || tiles == 0 {
        return img.clone();
    }
    let (w, h) = (w as usize, h as usize);
    let tiles = tiles as usize;
    let tile_w = w.div_ceil(tiles);
    let tile_h = h.div_ceil(tiles);
    let tile_area = tile_w * tile_h;

    let clip = if clip_limit > 0.0 {
        ((clip_limit * tile_area as f32 / 256.0) as usize).max(1)
    } else {
        usize::MAX
    };

    let src = img.as_raw();
    let mut luts = vec![[0u8; 256]; tiles * tiles];

    for ty in 0..tiles {
        for tx in 0..tiles {
            let mut hist = [0usize; 256];
            for py in ty * tile_h..(ty + 1) * tile_h {
                let sy = reflect101(py as isize, h);
                for px in tx * tile_w..(tx + 1) * tile_w {
                    let sx = reflect101(px as isize, w);
                    hist[src[sy * w + sx] as usize] += 1;
                }
            }
            clip_histogram(&mut hist, clip);
            luts[ty * tiles + tx] = equalisation_lut(&hist, tile_area);
        }
    }

    let mut out = GrayImage::new(w as u32, h as u32);
    let dst: &mut [u8] = &mut out;

    for y in 0..h {
        let (ty1, ty2, ya) = neighbours(y, tile_h, tiles);
        for x in 0..w {
            let (tx1, tx2, xa) = neighbours(x, tile_w, tiles);
            let v = src[y * w + x] as usize;
            let top = luts[ty1 * tiles + tx1][v] as f32 * (1.0 - xa)
                + luts[ty1 * tiles + tx2][v] as f32 * xa;
            let bottom = luts[ty2 * tiles + tx1][v] as f32 * (1.0 - xa)
                + luts[ty2 * tiles + tx2][v] as f32 * xa;
            let value = top * (1.0 - ya) + bottom * ya;
            dst[y * w + x] = value.round().clamp(0.0, 255.0) as u8;
        }
    }

    out
}

/// Clip every bin at `clip` and redistribute the excess uniformly.
fn clip_histogram(hist: &mut [usize; 256], clip: usize) {
    if clip == usize::MAX {
        return;
    }
    let mut clipped = 0usize;
    for bin in hist.iter_mut() {
        if *bin > clip {
            clipped += *bin - clip;
            *bin = clip;
        }
    }

    let batch = clipped / 256;
    let mut residual = clipped - batch * 256;
    for bin in hist.iter_mut() {
        *bin += batch;
    }
    if residual > 0 {
        let step = (256 / residual).max(1);
        let mut i = 0;
        while i < 256 && residual > 0 {
            hist[i] += 1;
            residual -= 1;
            i += step;
        }
    }
}

fn equalisation_lut(hist: &[usize; 256], area: usize) -> [u8; 256] {
    let scale = 255.0 / area as f32;
    let mut lut = [0u8; 256];
    let mut sum = 0usize;
    for (i, count) in hist.iter().enumerate() {
        sum += count;
        lut[i] = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// The two tile indices whose centres bracket `pos`, and the blend weight of the second.
fn neighbours(pos: usize, tile: usize, tiles: usize) -> (usize, usize, f32) {
    let f = pos as f32 / tile as f32 - 0.5;
    let t1 = f.floor();
    let a = f - t1;
    let t1 = t1 as isize;
    let lo = t1.max(0) as usize;
    let hi = ((t1 + 1).max(0) as usize).min(tiles - 1);
    (lo.min(tiles - 1), hi, a)
}

/// Mirror an index into `0..n` without repeating the edge pixel.
pub(crate) fn reflect101(mut i: isize, n: usize) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

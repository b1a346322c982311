//! Image enhancement: turn a scanned or photographed page into a clean
//! high-contrast bitmap that OCR reads reliably.
//!
//! ## Why a fixed chain?
//!
//! Lab reports are dense tables of small digits printed on light paper and
//! then scanned or photographed under uneven light. Each stage targets one
//! defect:
//!
//! 1. Grayscale: colour carries nothing for OCR.
//! 2. 2× bicubic upscale: small digits get enough pixels per stroke.
//! 3. CLAHE: evens out shadows and faded ink region by region.
//! 4. Non-local means: removes scanner grain without blurring strokes.
//! 5. Gaussian adaptive threshold: binarises against the local background.
//! 6. Close then open (3×3): seals broken strokes, then drops specks.
//! 7. Canny overlay: edge pixels are OR-ed in so character outlines stay crisp.
//!
//! The chain is deterministic; the same input and parameters always give
//! the same bitmap.

mod clahe;
mod denoise;
mod threshold;

pub use clahe::clahe;
pub use denoise::non_local_means;
pub use threshold::adaptive_gaussian_threshold;

use crate::config::EnhanceParams;
use crate::error::FileError;
use image::imageops::FilterType;
use image::{GrayImage, ImageFormat, ImageReader};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::morphology::{close, open};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Load an image file as 8-bit grayscale.
pub fn load_grayscale(path: &Path) -> Result<GrayImage, FileError> {
    let decode_error = |detail: String| FileError::Decode {
        path: path.to_path_buf(),
        detail,
    };
    // The decoder is picked from the file's leading bytes, not its extension.
    let img = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| decode_error(e.to_string()))?
        .decode()
        .map_err(|e| decode_error(e.to_string()))?;
    Ok(img.to_luma8())
}

/// Run the enhancement chain on a grayscale image.
///
/// The result is exactly `scale ×` the input in both dimensions and contains
/// only the values 0 and 255.
pub fn enhance(gray: &GrayImage, params: &EnhanceParams) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }

    let scale = params.scale.max(1);
    let upscaled = if scale == 1 {
        gray.clone()
    } else {
        image::imageops::resize(gray, w * scale, h * scale, FilterType::CatmullRom)
    };

    let equalised = clahe(&upscaled, params.clahe_clip_limit, params.clahe_tiles);
    let denoised = non_local_means(
        &equalised,
        params.denoise_strength,
        params.denoise_template,
        params.denoise_search,
    );
    let binary = adaptive_gaussian_threshold(
        &denoised,
        params.threshold_block,
        params.threshold_offset,
    );

    let radius = (params.morph_kernel / 2).min(u8::MAX as u32) as u8;
    let cleaned = if radius == 0 {
        binary
    } else {
        let closed = close(&binary, Norm::LInf, radius);
        open(&closed, Norm::LInf, radius)
    };

    let edges = canny(&cleaned, params.canny_low, params.canny_high);
    let mut out = cleaned;
    for (px, edge) in out.iter_mut().zip(edges.iter()) {
        *px |= *edge;
    }

    debug!(
        "Enhanced {}x{} → {}x{}",
        w,
        h,
        out.width(),
        out.height()
    );
    out
}

/// An enhanced bitmap persisted to a temporary PNG for the OCR engine.
///
/// The file is deleted when this value is dropped, on success and on error
/// alike.
#[derive(Debug)]
pub struct ProcessedImage {
    file: NamedTempFile,
    width: u32,
    height: u32,
}

impl ProcessedImage {
    /// Write `img` to a fresh temporary PNG.
    pub fn persist(img: &GrayImage) -> Result<Self, FileError> {
        let mut file = tempfile::Builder::new()
            .prefix("bloodcount-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| FileError::TempFile(e.to_string()))?;
        {
            let mut writer = BufWriter::new(file.as_file_mut());
            img.write_to(&mut writer, ImageFormat::Png)
                .map_err(|e| FileError::TempFile(e.to_string()))?;
            writer
                .flush()
                .map_err(|e| FileError::TempFile(e.to_string()))?;
        }
        Ok(Self {
            file,
            width: img.width(),
            height: img.height(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Enhance a grayscale page and write it to a temporary PNG.
///
/// When `keep_as` is given, the bitmap is also saved there; a failure to
/// keep the copy is logged and otherwise ignored.
pub fn enhance_to_file(
    page: &GrayImage,
    params: &EnhanceParams,
    keep_as: Option<PathBuf>,
) -> Result<ProcessedImage, FileError> {
    let enhanced = enhance(page, params);
    if let Some(dest) = keep_as {
        if let Err(e) = enhanced.save_with_format(&dest, ImageFormat::Png) {
            warn!("Could not keep processed image {}: {}", dest.display(), e);
        }
    }
    ProcessedImage::persist(&enhanced)
}

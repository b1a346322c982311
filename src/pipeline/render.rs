//! PDF access: embedded text per page, and page rasterisation via pdfium.
//!
//! ## Why a trait?
//!
//! [`PdfBackend`] is the seam between the text-recovery logic and the pdfium
//! C library. The extractor only needs two things from a PDF (the text
//! layer of every page, and bitmaps of some pages), so tests can substitute
//! an in-memory document and exercise the fallback rules without a pdfium
//! binary on the machine.
//!
//! ## Why bind per operation?
//!
//! The `Pdfium` handle borrows into every document and page it opens, so it
//! cannot be stored next to them. [`PdfiumBackend`] keeps only the library
//! location and binds a fresh handle for each call; the OS caches the
//! `dlopen`, so repeated binds are cheap. The constructor binds once up
//! front so a missing library is reported before any file is touched.
//!
//! ## Why cap pixels, not DPI?
//!
//! At 72 DPI a page renders at its size in points. A poster-sized page at a
//! higher DPI could produce a bitmap of hundreds of megapixels, which the
//! enhancement chain then doubles. `max_rendered_pixels` caps the longest
//! edge whatever the physical size.

use crate::config::ExtractionConfig;
use crate::error::{BloodCountError, FileError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Receives rendered pages one at a time: `(page_index_0based, bitmap)`.
pub type PageSink<'a> = dyn FnMut(usize, DynamicImage) -> Result<(), FileError> + 'a;

/// Read access to PDF documents.
pub trait PdfBackend: Send + Sync {
    /// Embedded text of every page, in page order. One entry per page,
    /// empty when a page has no text layer.
    fn page_texts(&self, path: &Path, password: Option<&str>) -> Result<Vec<String>, FileError>;

    /// Rasterise the listed pages in the given order, handing each bitmap to
    /// `sink` before the next page is rendered. The first error from either
    /// rendering or the sink stops the walk and is returned.
    fn render_pages(
        &self,
        path: &Path,
        password: Option<&str>,
        pages: &[usize],
        sink: &mut PageSink<'_>,
    ) -> Result<(), FileError>;
}

/// [`PdfBackend`] backed by the pdfium shared library.
#[derive(Debug, Clone)]
pub struct PdfiumBackend {
    library: Option<PathBuf>,
    dpi: u32,
    max_pixels: u32,
}

impl PdfiumBackend {
    /// Create a backend, verifying that pdfium can be bound.
    ///
    /// Discovery order:
    /// 1. `config.pdfium_library` (a library file, or a directory holding one)
    /// 2. Alongside the running executable
    /// 3. System library search paths
    pub fn new(config: &ExtractionConfig) -> Result<Self, BloodCountError> {
        let backend = Self {
            library: config.pdfium_library.clone(),
            dpi: config.render_dpi,
            max_pixels: config.max_rendered_pixels,
        };
        backend
            .bind()
            .map_err(BloodCountError::PdfiumBindingFailed)?;
        info!("pdfium bound");
        Ok(backend)
    }

    fn bind(&self) -> Result<Pdfium, String> {
        if let Some(path) = &self.library {
            let lib_path = if path.is_dir() {
                PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(
                    path.to_string_lossy().as_ref(),
                ))
            } else {
                path.clone()
            };
            debug!("Loading pdfium from {}", lib_path.display());
            let bindings = Pdfium::bind_to_library(&lib_path)
                .map_err(|e| format!("cannot load {}: {e}", lib_path.display()))?;
            return Ok(Pdfium::new(bindings));
        }

        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!("Loaded pdfium next to the executable");
                return Ok(Pdfium::new(bindings));
            }
        }

        let bindings = Pdfium::bind_to_system_library()
            .map_err(|e| format!("pdfium library not found: {e}"))?;
        Ok(Pdfium::new(bindings))
    }

    fn bind_for_file(&self) -> Result<Pdfium, FileError> {
        self.bind().map_err(FileError::Internal)
    }
}

impl PdfBackend for PdfiumBackend {
    fn page_texts(&self, path: &Path, password: Option<&str>) -> Result<Vec<String>, FileError> {
        let pdfium = self.bind_for_file()?;
        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| map_load_error(path, e))?;

        let pages = document.pages();
        debug!("PDF loaded: {} pages", pages.len());

        let mut texts = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let text = page.text().map(|t| t.all()).map_err(|e| {
                FileError::CorruptPdf {
                    path: path.to_path_buf(),
                    detail: format!("page {}: cannot read text layer: {e:?}", idx + 1),
                }
            })?;
            texts.push(text);
        }
        Ok(texts)
    }

    fn render_pages(
        &self,
        path: &Path,
        password: Option<&str>,
        page_indices: &[usize],
        sink: &mut PageSink<'_>,
    ) -> Result<(), FileError> {
        let pdfium = self.bind_for_file()?;
        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| map_load_error(path, e))?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;

        for &idx in page_indices {
            let rasterisation = |detail: String| FileError::Rasterisation {
                page: idx + 1,
                detail,
            };

            if idx >= total_pages {
                return Err(rasterisation(format!(
                    "out of range (document has {total_pages} pages)"
                )));
            }
            let page_index = u16::try_from(idx)
                .map_err(|_| rasterisation("page index exceeds u16".to_string()))?;

            let page = pages
                .get(page_index)
                .map_err(|e| rasterisation(format!("{e:?}")))?;

            let (w, h) = compute_render_dimensions(
                page.width().value,
                page.height().value,
                self.dpi,
                self.max_pixels,
            );

            let render_config = PdfRenderConfig::new()
                .set_target_width(w as i32)
                .set_maximum_height(h as i32);

            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| rasterisation(format!("{e:?}")))?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );

            sink(idx, image)?;
        }

        Ok(())
    }
}

/// Tell encrypted documents apart from damaged ones.
fn map_load_error(path: &Path, e: PdfiumError) -> FileError {
    let detail = format!("{e:?}");
    if detail.to_lowercase().contains("password") {
        FileError::PasswordRequired {
            path: path.to_path_buf(),
        }
    } else {
        FileError::CorruptPdf {
            path: path.to_path_buf(),
            detail,
        }
    }
}

/// Pixel size for a page of `width_points × height_points` at `dpi`.
///
/// Both sides are at least 1. When the longer side exceeds `max_pixels`,
/// both are scaled down together so the aspect ratio is kept.
pub fn compute_render_dimensions(
    width_points: f32,
    height_points: f32,
    dpi: u32,
    max_pixels: u32,
) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let longest = raw_w.max(raw_h);
    let max = max_pixels.max(1) as f32;
    if longest > max {
        let ratio = max / longest;
        let w = ((raw_w * ratio).round() as u32).clamp(1, max_pixels);
        let h = ((raw_h * ratio).round() as u32).clamp(1, max_pixels);
        warn!(
            "Page {}x{} px capped to {}x{} px",
            raw_w as u32, raw_h as u32, w, h
        );
        (w, h)
    } else {
        (raw_w.round() as u32, raw_h.round() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_at_native_size() {
        // A4 = 595 × 842 pt; at 72 DPI one point is one pixel.
        assert_eq!(compute_render_dimensions(595.0, 842.0, 72, 10_000), (595, 842));
    }

    #[test]
    fn a4_at_300dpi() {
        let (w, h) = compute_render_dimensions(595.0, 842.0, 300, 10_000);
        assert!((2470..=2482).contains(&w), "got {w}");
        assert!((3500..=3512).contains(&h), "got {h}");
    }

    #[test]
    fn oversized_page_is_capped_keeping_aspect() {
        let (w, h) = compute_render_dimensions(5000.0, 10_000.0, 72, 2000);
        assert_eq!(h, 2000);
        assert_eq!(w, 1000);
    }

    #[test]
    fn degenerate_page_is_at_least_one_pixel() {
        assert_eq!(compute_render_dimensions(0.0, 0.0, 72, 10_000), (1, 1));
    }

    #[test]
    fn missing_library_is_a_binding_error() {
        let config = ExtractionConfig::builder()
            .pdfium_library("/nonexistent/libpdfium.so")
            .build()
            .unwrap();
        let err = PdfiumBackend::new(&config).unwrap_err();
        assert!(matches!(err, BloodCountError::PdfiumBindingFailed(_)));
    }
}

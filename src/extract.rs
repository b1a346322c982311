//! Text recovery: turn lab-report files into plain text.
//!
//! ## Strategy per file
//!
//! ```text
//! classify ──▶ .pdf ──▶ embedded text ──(blank)──▶ rasterise ─┐
//!    │                      │                                 ├─▶ enhance ──▶ OCR
//!    │                      └──▶ done                         │
//!    ├──────▶ .png/.jpg/.jpeg ────────────────────────────────┘
//!    └──────▶ anything else ──▶ skipped
//! ```
//!
//! A PDF's text layer is exact and free, so OCR only runs when it is missing.
//! With [`FallbackPolicy::DocumentWide`] that decision is taken once for the
//! whole document; with [`FallbackPolicy::PerPage`] each blank page is OCR'd
//! on its own and pages that do have text keep it.
//!
//! ## Failure isolation
//!
//! Every file ends in exactly one [`FileOutcome`]. An error anywhere in a
//! file's processing, including a single page's OCR failure, fails that file
//! and only that file: the batch moves on to the next input.
//!
//! ## Why spawn_blocking?
//!
//! Enhancement is CPU-heavy, pdfium is a blocking C library and tesseract is
//! a child process. The per-file work is synchronous and the async entry
//! points move it onto tokio's blocking pool so runtime worker threads never
//! stall. Files are processed one after another, never concurrently.

use crate::config::{ExtractionConfig, FallbackPolicy};
use crate::error::{BloodCountError, FileError};
use crate::output::{BatchReport, ExtractionResult, FileOutcome, PageText, TextSource};
use crate::pipeline::enhance::{enhance_to_file, load_grayscale};
use crate::pipeline::input::{self, classify, display_name, DocumentKind};
use crate::pipeline::ocr::{OcrEngine, TesseractEngine};
use crate::pipeline::render::{PdfBackend, PdfiumBackend};
use image::{DynamicImage, GrayImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Reason recorded for files whose extension is not handled.
pub const UNSUPPORTED_EXTENSION: &str = "unsupported extension";

/// Recovers text from PDF and image files.
///
/// Cheap to clone: engines are shared behind `Arc`.
#[derive(Clone)]
pub struct DocumentTextExtractor {
    config: ExtractionConfig,
    ocr: Arc<dyn OcrEngine>,
    pdf: Arc<dyn PdfBackend>,
}

impl std::fmt::Debug for DocumentTextExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentTextExtractor")
            .field("config", &self.config)
            .field("ocr", &"<dyn OcrEngine>")
            .field("pdf", &"<dyn PdfBackend>")
            .finish()
    }
}

impl DocumentTextExtractor {
    /// Create an extractor using tesseract and pdfium.
    ///
    /// Fails when pdfium cannot be bound. A missing tesseract binary is only
    /// noticed on the first OCR call and fails that file.
    pub fn new(config: ExtractionConfig) -> Result<Self, BloodCountError> {
        let pdf = PdfiumBackend::new(&config)?;
        Ok(Self::with_engines(
            config,
            Arc::new(TesseractEngine::new()),
            Arc::new(pdf),
        ))
    }

    /// Create an extractor with caller-supplied engines.
    pub fn with_engines(
        config: ExtractionConfig,
        ocr: Arc<dyn OcrEngine>,
        pdf: Arc<dyn PdfBackend>,
    ) -> Self {
        Self { config, ocr, pdf }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    // ── Batch entry points ───────────────────────────────────────────────

    /// Process every input (local path or URL) in order and collect the outcomes.
    ///
    /// Never fails as a whole: per-file problems are recorded in the report.
    pub async fn extract_files<I, S>(&self, inputs: I) -> BatchReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let inputs: Vec<String> = inputs.into_iter().map(|s| s.as_ref().to_string()).collect();
        let total = inputs.len();
        info!("Starting batch: {} files", total);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }

        let mut report = BatchReport::default();
        for (i, input_str) in inputs.iter().enumerate() {
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_file_start(i + 1, total, &input::input_name(input_str));
            }
            let outcome = self.extract_input(input_str).await;
            report.push(outcome);
        }

        info!(
            "Batch complete: {} succeeded, {} skipped, {} failed",
            report.succeeded, report.skipped, report.failed
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(total, report.succeeded);
        }
        report
    }

    /// Blocking variant of [`extract_files`](Self::extract_files) for local paths.
    pub fn extract_paths_blocking<P: AsRef<Path>>(&self, paths: &[P]) -> BatchReport {
        let total = paths.len();
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }
        let mut report = BatchReport::default();
        for (i, path) in paths.iter().enumerate() {
            let path = path.as_ref();
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_file_start(i + 1, total, &display_name(path));
            }
            report.push(self.extract_path(path));
        }
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(total, report.succeeded);
        }
        report
    }

    // ── Single-file entry points ─────────────────────────────────────────

    /// Process one input, which may be a local path or an HTTP(S) URL.
    pub async fn extract_input(&self, input_str: &str) -> FileOutcome {
        let file_name = input::input_name(input_str);
        if classify(Path::new(&file_name)).is_none() {
            return self.skipped(file_name);
        }

        let resolved = match input::resolve_input(input_str, self.config.download_timeout_secs).await
        {
            Ok(r) => r,
            Err(e) => return self.failed(file_name, e),
        };

        let this = self.clone();
        let path = resolved.path().to_path_buf();
        let outcome = tokio::task::spawn_blocking(move || this.extract_path(&path))
            .await
            .unwrap_or_else(|e| {
                self.failed(
                    file_name.clone(),
                    FileError::Internal(format!("extraction task panicked: {e}")),
                )
            });

        // The download (if any) is removed only once extraction has finished.
        drop(resolved);
        outcome
    }

    /// Process one local file, blocking the current thread.
    pub fn extract_path(&self, path: &Path) -> FileOutcome {
        let file_name = display_name(path);
        let Some(kind) = classify(path) else {
            return self.skipped(file_name);
        };

        info!("Processing {} ({:?})", file_name, kind);
        let start = Instant::now();

        let pages = match kind {
            DocumentKind::Image => self.image_text(path),
            DocumentKind::Pdf => self.pdf_text(path, &file_name),
        };

        match pages {
            Ok(pages) => {
                let mut text = String::new();
                let mut provenance = Vec::with_capacity(pages.len());
                for (index, source, page_text) in pages {
                    provenance.push(PageText {
                        index,
                        source,
                        chars: page_text.chars().count(),
                    });
                    text.push_str(&page_text);
                }
                let result = ExtractionResult {
                    file_name,
                    kind,
                    text,
                    pages: provenance,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
                info!(
                    "{}: {} chars from {} pages ({} OCR) in {}ms",
                    result.file_name,
                    result.text.chars().count(),
                    result.pages.len(),
                    result.ocr_pages(),
                    result.duration_ms
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_file_succeeded(&result.file_name, result.text.len());
                }
                FileOutcome::Succeeded(result)
            }
            Err(e) => self.failed(file_name, e),
        }
    }

    // ── Strategies ───────────────────────────────────────────────────────

    fn image_text(&self, path: &Path) -> Result<Vec<(usize, TextSource, String)>, FileError> {
        let gray = load_grayscale(path)?;
        let text = self.ocr_page(&gray, path, 0)?;
        Ok(vec![(0, TextSource::Ocr, text)])
    }

    fn pdf_text(
        &self,
        path: &Path,
        file_name: &str,
    ) -> Result<Vec<(usize, TextSource, String)>, FileError> {
        let password = self.config.password.as_deref();
        let embedded = self.pdf.page_texts(path, password)?;
        debug!("{}: {} pages with a text layer checked", file_name, embedded.len());

        let blank: Vec<usize> = match self.config.fallback {
            FallbackPolicy::DocumentWide => {
                if embedded.iter().all(|t| t.trim().is_empty()) {
                    (0..embedded.len()).collect()
                } else {
                    Vec::new()
                }
            }
            FallbackPolicy::PerPage => embedded
                .iter()
                .enumerate()
                .filter(|(_, t)| t.trim().is_empty())
                .map(|(i, _)| i)
                .collect(),
        };

        if blank.is_empty() {
            debug!("{}: using embedded text", file_name);
            // Whitespace-only pages contribute nothing.
            return Ok(embedded
                .into_iter()
                .enumerate()
                .filter(|(_, t)| !t.trim().is_empty())
                .map(|(i, t)| (i, TextSource::Embedded, t))
                .collect());
        }

        info!(
            "{}: no embedded text on {} of {} pages, running OCR",
            file_name,
            blank.len(),
            embedded.len()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_ocr_fallback(file_name, blank.len());
        }

        let mut recognised: Vec<(usize, String)> = Vec::with_capacity(blank.len());
        self.pdf
            .render_pages(path, password, &blank, &mut |idx: usize, bitmap: DynamicImage| {
                let text = self.ocr_page(&bitmap.to_luma8(), path, idx)?;
                recognised.push((idx, text));
                Ok(())
            })?;

        if recognised.len() != blank.len() {
            return Err(FileError::Internal(format!(
                "rendered {} of {} pages",
                recognised.len(),
                blank.len()
            )));
        }

        let mut recognised = recognised.into_iter().peekable();
        let mut pages = Vec::with_capacity(embedded.len());
        for (i, embedded_text) in embedded.into_iter().enumerate() {
            match recognised.peek() {
                Some((idx, _)) if *idx == i => {
                    if let Some((_, text)) = recognised.next() {
                        pages.push((i, TextSource::Ocr, text));
                    }
                }
                _ => pages.push((i, TextSource::Embedded, embedded_text)),
            }
        }
        Ok(pages)
    }

    /// Enhance one page, OCR it, and let the temporary bitmap go.
    fn ocr_page(&self, gray: &GrayImage, source: &Path, index: usize) -> Result<String, FileError> {
        let keep_as = self.keep_path(source, index);
        let processed = enhance_to_file(gray, &self.config.enhance, keep_as)?;
        debug!(
            "Page {}: enhanced to {}x{}, running OCR",
            index + 1,
            processed.dimensions().0,
            processed.dimensions().1
        );
        self.ocr
            .recognize(processed.path(), &self.config.ocr)
            .map_err(|detail| FileError::Ocr {
                page: index + 1,
                detail,
            })
    }

    /// `<dir>/<stem>-p<N>.png` when processed bitmaps are kept.
    fn keep_path(&self, source: &Path, index: usize) -> Option<PathBuf> {
        let dir = self.config.keep_processed_dir.as_ref()?;
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("Cannot create {}: {}", dir.display(), e);
            return None;
        }
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "page".to_string());
        Some(dir.join(format!("{stem}-p{}.png", index + 1)))
    }

    // ── Outcome helpers ──────────────────────────────────────────────────

    fn skipped(&self, file_name: String) -> FileOutcome {
        info!("Skipping {}: {}", file_name, UNSUPPORTED_EXTENSION);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_file_skipped(&file_name, UNSUPPORTED_EXTENSION);
        }
        FileOutcome::Skipped {
            file_name,
            reason: UNSUPPORTED_EXTENSION.to_string(),
        }
    }

    fn failed(&self, file_name: String, error: FileError) -> FileOutcome {
        error!("{}: {}", file_name, error);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_file_failed(&file_name, &error.to_string());
        }
        FileOutcome::Failed { file_name, error }
    }
}

/// Process files with tesseract and pdfium, in order.
///
/// Fails only when the extractor itself cannot be created.
pub async fn extract_files<I, S>(
    inputs: I,
    config: ExtractionConfig,
) -> Result<BatchReport, BloodCountError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let extractor = DocumentTextExtractor::new(config)?;
    Ok(extractor.extract_files(inputs).await)
}

/// Synchronous wrapper around [`extract_files`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_files_sync<I, S>(
    inputs: I,
    config: ExtractionConfig,
) -> Result<BatchReport, BloodCountError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tokio::runtime::Runtime::new()
        .map_err(|e| BloodCountError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_files(inputs, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OcrOptions;
    use image::Luma;
    use std::sync::Mutex;

    struct EchoOcr;

    impl OcrEngine for EchoOcr {
        fn recognize(&self, image: &Path, _options: &OcrOptions) -> Result<String, String> {
            let img = image::open(image).map_err(|e| e.to_string())?;
            Ok(format!("{}x{};", img.width(), img.height()))
        }
    }

    struct NoPdf;

    impl PdfBackend for NoPdf {
        fn page_texts(&self, path: &Path, _: Option<&str>) -> Result<Vec<String>, FileError> {
            Err(FileError::CorruptPdf {
                path: path.to_path_buf(),
                detail: "no backend".into(),
            })
        }

        fn render_pages(
            &self,
            _: &Path,
            _: Option<&str>,
            _: &[usize],
            _: &mut crate::pipeline::render::PageSink<'_>,
        ) -> Result<(), FileError> {
            unreachable!("nothing to render")
        }
    }

    /// Two pages: one with text, one scanned.
    struct MixedPdf {
        rendered: Mutex<Vec<usize>>,
    }

    impl PdfBackend for MixedPdf {
        fn page_texts(&self, _: &Path, _: Option<&str>) -> Result<Vec<String>, FileError> {
            Ok(vec!["Гемоглобин 115\n".into(), "  \n".into()])
        }

        fn render_pages(
            &self,
            _: &Path,
            _: Option<&str>,
            pages: &[usize],
            sink: &mut crate::pipeline::render::PageSink<'_>,
        ) -> Result<(), FileError> {
            for &p in pages {
                self.rendered.lock().unwrap().push(p);
                sink(p, DynamicImage::ImageLuma8(GrayImage::from_pixel(6, 4, Luma([255]))))?;
            }
            Ok(())
        }
    }

    fn extractor(pdf: Arc<dyn PdfBackend>, fallback: FallbackPolicy) -> DocumentTextExtractor {
        let config = ExtractionConfig::builder().fallback(fallback).build().unwrap();
        DocumentTextExtractor::with_engines(config, Arc::new(EchoOcr), pdf)
    }

    #[test]
    fn image_is_enhanced_then_recognised() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        GrayImage::from_pixel(10, 7, Luma([200])).save(&path).unwrap();

        let outcome = extractor(Arc::new(NoPdf), FallbackPolicy::DocumentWide).extract_path(&path);
        let result = outcome.result().expect("succeeded");
        assert_eq!(result.text, "20x14;");
        assert_eq!(result.kind, DocumentKind::Image);
        assert_eq!(result.ocr_pages(), 1);
    }

    #[test]
    fn document_wide_keeps_partial_embedded_text() {
        let pdf = Arc::new(MixedPdf {
            rendered: Mutex::new(Vec::new()),
        });
        let ex = extractor(pdf.clone(), FallbackPolicy::DocumentWide);
        let outcome = ex.extract_path(Path::new("report.pdf"));
        let result = outcome.result().expect("succeeded");
        assert_eq!(result.text, "Гемоглобин 115\n");
        assert_eq!(result.pages.len(), 1);
        assert_eq!(result.pages[0].index, 0);
        assert!(pdf.rendered.lock().unwrap().is_empty());
    }

    #[test]
    fn per_page_ocrs_only_blank_pages() {
        let pdf = Arc::new(MixedPdf {
            rendered: Mutex::new(Vec::new()),
        });
        let ex = extractor(pdf.clone(), FallbackPolicy::PerPage);
        let outcome = ex.extract_path(Path::new("report.pdf"));
        let result = outcome.result().expect("succeeded");
        assert_eq!(result.text, "Гемоглобин 115\n12x8;");
        assert_eq!(*pdf.rendered.lock().unwrap(), vec![1]);
        assert_eq!(result.pages[0].source, TextSource::Embedded);
        assert_eq!(result.pages[1].source, TextSource::Ocr);
    }

    #[test]
    fn corrupt_pdf_fails_the_file() {
        let outcome =
            extractor(Arc::new(NoPdf), FallbackPolicy::DocumentWide).extract_path(Path::new("x.pdf"));
        assert!(matches!(
            outcome,
            FileOutcome::Failed {
                error: FileError::CorruptPdf { .. },
                ..
            }
        ));
    }

    #[test]
    fn keep_path_uses_stem_and_page_number() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExtractionConfig::builder()
            .keep_processed_dir(dir.path().join("kept"))
            .build()
            .unwrap();
        let ex = DocumentTextExtractor::with_engines(config, Arc::new(EchoOcr), Arc::new(NoPdf));
        let kept = ex.keep_path(Path::new("/in/report.pdf"), 2).unwrap();
        assert_eq!(kept, dir.path().join("kept").join("report-p3.png"));
    }
}

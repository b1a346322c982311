//! # bloodcount
//!
//! Recover text from scanned blood-test reports and pull out the key
//! blood-count values.
//!
//! ## Why this crate?
//!
//! Lab reports arrive as phone photos, flatbed scans and PDFs, some with a
//! text layer and most without. Feeding a raw photo to OCR gives garbage on
//! small table digits, so every bitmap is first run through a fixed
//! enhancement chain (upscale, local contrast, denoise, adaptive threshold,
//! morphology, edge overlay). PDFs with a text layer skip all of that.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file or URL
//!  │
//!  ├─ 1. Input    resolve local file or download from URL
//!  ├─ 2. Classify .pdf / .png / .jpg / .jpeg; anything else is skipped
//!  ├─ 3. Text     PDF text layer, or rasterise (pdfium) when it is blank
//!  ├─ 4. Enhance  2× upscale → CLAHE → NL-means → threshold → close/open → edges
//!  ├─ 5. OCR      tesseract, rus+eng, --psm 4 --oem 3
//!  └─ 6. Fields   optional: language model → `Label: value` → FieldMap
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bloodcount::{DocumentTextExtractor, ExtractionConfig, FieldExtractionConfig, FieldExtractor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let extractor = DocumentTextExtractor::new(ExtractionConfig::default())?;
//!     let report = extractor.extract_files(["scan_01.jpg", "report.pdf"]).await;
//!
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let fields = FieldExtractor::new(FieldExtractionConfig::default())?;
//!     for result in report.results() {
//!         let values = fields.extract_typed(&result.text).await?;
//!         println!("{}: {:?}", result.file_name, values);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## External engines
//!
//! | Engine | Used for | Located by |
//! |--------|----------|------------|
//! | `tesseract` with `rus` + `eng` data | OCR | `OcrOptions::tesseract_cmd` (default: `PATH`) |
//! | pdfium shared library | PDF text + rasterisation | `ExtractionConfig::pdfium_library`, next to the binary, or system paths |
//! | LLM provider | field extraction | `FieldExtractionConfig`, then environment |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `bloodcount` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! bloodcount = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    EnhanceParams, ExtractionConfig, ExtractionConfigBuilder, FallbackPolicy,
    FieldExtractionConfig, OcrOptions, DEFAULT_FIELD_MODEL,
};
pub use error::{BloodCountError, FileError};
pub use extract::{extract_files, extract_files_sync, DocumentTextExtractor};
pub use output::{
    BatchReport, BloodTestFields, ExtractionResult, FieldMap, FileOutcome, PageText, TextSource,
};
pub use pipeline::enhance::enhance;
pub use pipeline::fields::{extract_fields, FieldExtractor};
pub use pipeline::input::DocumentKind;
pub use pipeline::ocr::{OcrEngine, TesseractEngine};
pub use pipeline::postprocess::parse_fields;
pub use pipeline::render::{PdfBackend, PdfiumBackend};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_stream, OutcomeStream};

//! Pipeline stages for recovering report text and extracting fields.
//!
//! Each submodule implements exactly one step. Keeping stages separate makes
//! each independently testable and lets the external engines (pdfium,
//! tesseract, the LLM provider) sit behind narrow seams.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ enhance ──▶ ocr ──▶ (text) ──▶ fields ──▶ postprocess
//! (URL/path) (pdfium)  (imageproc) (tesseract)         (LLM)     (parse)
//! ```
//!
//! 1. [`input`]   canonicalise the user-supplied path or URL and classify it
//! 2. [`render`]  read a PDF's text layer, rasterise pages that need OCR
//! 3. [`enhance`] deterministic image cleanup before recognition
//! 4. [`ocr`]     run the OCR engine on an enhanced bitmap
//! 5. [`fields`]  ask the language model for the blood-count values, with
//!    retry/backoff; the only stage with network I/O besides downloads
//! 6. [`postprocess`] clean the model's answer and parse `Label: value` lines

pub mod enhance;
pub mod fields;
pub mod input;
pub mod ocr;
pub mod postprocess;
pub mod render;

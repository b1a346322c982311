//! Error types for the bloodcount library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BloodCountError`]: **Fatal**: the call cannot proceed at all
//!   (pdfium cannot be bound, invalid configuration, no LLM provider).
//!   Returned as `Err(BloodCountError)` from constructors and from the
//!   field-extraction entry points.
//!
//! * [`FileError`]: **Non-fatal**: a single input file failed (undecodable
//!   image, corrupt PDF, OCR engine fault) but the rest of the batch is fine.
//!   Stored inside [`crate::output::FileOutcome::Failed`] so one bad file never
//!   aborts a batch, and callers can still tell a failure from a skip.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the bloodcount library.
///
/// Per-file failures use [`FileError`] and are stored in
/// [`crate::output::FileOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum BloodCountError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (or pass --pdfium-lib) to use an\n\
existing copy, or install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API kept failing after all retries.
    #[error("LLM API error after {retries} retries: {message}")]
    LlmApiError { retries: u32, message: String },

    /// The model answered, but nothing in the answer looked like `Label: value`.
    #[error("Model response contained no `Label: value` lines")]
    EmptyModelResponse,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single input file.
///
/// Stored in [`crate::output::FileOutcome::Failed`]. The batch continues with
/// the next file regardless of which variant occurred.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum FileError {
    /// Input file was not found at the given path.
    #[error("file not found: '{path}'")]
    NotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The image could not be decoded.
    #[error("cannot decode image '{path}': {detail}")]
    Decode { path: PathBuf, detail: String },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none (or a wrong one) was provided.
    #[error("PDF '{path}' is encrypted and needs a valid password")]
    PasswordRequired { path: PathBuf },

    /// pdfium could not read or render a page (1-indexed).
    #[error("page {page}: rasterisation failed: {detail}")]
    Rasterisation { page: usize, detail: String },

    /// The OCR engine failed on a page (1-indexed; images are page 1).
    #[error("page {page}: OCR engine failed: {detail}")]
    Ocr { page: usize, detail: String },

    /// The processed bitmap could not be written to its temporary file.
    #[error("cannot write processed image: {0}")]
    TempFile(String),

    /// A URL input could not be downloaded.
    #[error("failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Unexpected internal error (e.g. a panicked worker thread).
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ocr_error_names_page() {
        let e = FileError::Ocr {
            page: 3,
            detail: "tesseract exited with status 1".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("page 3"), "got: {msg}");
        assert!(msg.contains("status 1"));
    }

    #[test]
    fn decode_error_names_file() {
        let e = FileError::Decode {
            path: PathBuf::from("scan_01.png"),
            detail: "invalid PNG signature".into(),
        };
        assert!(e.to_string().contains("scan_01.png"));
    }

    #[test]
    fn llm_error_display() {
        let e = BloodCountError::LlmApiError {
            retries: 2,
            message: "HTTP 503".into(),
        };
        assert!(e.to_string().contains("2 retries"));
        assert!(e.to_string().contains("503"));
    }

    #[test]
    fn fatal_errors_have_messages() {
        let all = [
            BloodCountError::InvalidConfig("scale must be ≥ 1".into()),
            BloodCountError::PdfiumBindingFailed("not found".into()),
            BloodCountError::ProviderNotConfigured {
                provider: "openai".into(),
                hint: "set OPENAI_API_KEY".into(),
            },
            BloodCountError::LlmApiError {
                retries: 0,
                message: "timeout".into(),
            },
            BloodCountError::EmptyModelResponse,
            BloodCountError::Internal("boom".into()),
        ];
        for e in &all {
            // Exhaustive: a new variant must be listed above.
            match e {
                BloodCountError::InvalidConfig(_)
                | BloodCountError::PdfiumBindingFailed(_)
                | BloodCountError::ProviderNotConfigured { .. }
                | BloodCountError::LlmApiError { .. }
                | BloodCountError::EmptyModelResponse
                | BloodCountError::Internal(_) => assert!(!e.to_string().is_empty()),
            }
        }
    }

    #[test]
    fn file_error_serialises() {
        let e = FileError::Rasterisation {
            page: 2,
            detail: "bad xobject".into(),
        };
        let json = serde_json::to_string(&e).expect("serialise");
        assert!(json.contains("Rasterisation"));
        let back: FileError = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, e);
    }
}

//! Configuration types for text recovery and field extraction.
//!
//! Text recovery is controlled through [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`]. The language-model step has its own, much
//! smaller [`FieldExtractionConfig`] because it runs after (and independently
//! of) OCR and may be skipped entirely.
//!
//! Engine locations (the tesseract binary, the pdfium shared library) and
//! credentials are plain fields here rather than process-wide state, so two
//! extractors with different engines can live in the same process.

use crate::error::BloodCountError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for recovering text from lab-report files.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use bloodcount::{ExtractionConfig, FallbackPolicy};
///
/// let config = ExtractionConfig::builder()
///     .tesseract_cmd("/usr/local/bin/tesseract")
///     .fallback(FallbackPolicy::PerPage)
///     .build()
///     .unwrap();
/// assert_eq!(config.ocr.languages, vec!["rus", "eng"]);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// How the OCR engine is invoked.
    pub ocr: OcrOptions,

    /// Parameters of the image enhancement chain.
    pub enhance: EnhanceParams,

    /// When a PDF falls back from embedded text to OCR. Default: [`FallbackPolicy::DocumentWide`].
    pub fallback: FallbackPolicy,

    /// Rendering DPI for scanned PDF pages. Default: 72 (the page's native size in points).
    pub render_dpi: u32,

    /// Cap on either rendered dimension in pixels. Default: 10000.
    pub max_rendered_pixels: u32,

    /// Explicit path to the pdfium shared library. `None` searches the system.
    pub pdfium_library: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Also write every enhanced bitmap into this directory (`<stem>-p<N>.png`).
    pub keep_processed_dir: Option<PathBuf>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives per-file events during batch processing.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            ocr: OcrOptions::default(),
            enhance: EnhanceParams::default(),
            fallback: FallbackPolicy::default(),
            render_dpi: 72,
            max_rendered_pixels: 10_000,
            pdfium_library: None,
            password: None,
            keep_processed_dir: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("ocr", &self.ocr)
            .field("enhance", &self.enhance)
            .field("fallback", &self.fallback)
            .field("render_dpi", &self.render_dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pdfium_library", &self.pdfium_library)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("keep_processed_dir", &self.keep_processed_dir)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn tesseract_cmd(mut self, cmd: impl Into<PathBuf>) -> Self {
        self.config.ocr.tesseract_cmd = cmd.into();
        self
    }

    /// Tesseract language codes, e.g. `["rus", "eng"]`.
    pub fn languages<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.ocr.languages = langs.into_iter().map(Into::into).collect();
        self
    }

    pub fn page_segmentation_mode(mut self, psm: u8) -> Self {
        self.config.ocr.page_segmentation_mode = psm;
        self
    }

    pub fn engine_mode(mut self, oem: u8) -> Self {
        self.config.ocr.engine_mode = oem;
        self
    }

    pub fn ocr(mut self, ocr: OcrOptions) -> Self {
        self.config.ocr = ocr;
        self
    }

    pub fn enhance(mut self, params: EnhanceParams) -> Self {
        self.config.enhance = params;
        self
    }

    pub fn fallback(mut self, policy: FallbackPolicy) -> Self {
        self.config.fallback = policy;
        self
    }

    pub fn render_dpi(mut self, dpi: u32) -> Self {
        self.config.render_dpi = dpi.clamp(36, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn keep_processed_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.keep_processed_dir = Some(dir.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, BloodCountError> {
        let c = &self.config;
        if c.ocr.languages.is_empty() {
            return Err(BloodCountError::InvalidConfig(
                "At least one OCR language is required".into(),
            ));
        }
        if c.ocr.tesseract_cmd.as_os_str().is_empty() {
            return Err(BloodCountError::InvalidConfig(
                "Tesseract command must not be empty".into(),
            ));
        }
        if c.ocr.page_segmentation_mode > 13 {
            return Err(BloodCountError::InvalidConfig(format!(
                "Page segmentation mode must be 0–13, got {}",
                c.ocr.page_segmentation_mode
            )));
        }
        if c.ocr.engine_mode > 3 {
            return Err(BloodCountError::InvalidConfig(format!(
                "OCR engine mode must be 0–3, got {}",
                c.ocr.engine_mode
            )));
        }
        c.enhance.validate()?;
        Ok(self.config)
    }
}

// ── OCR options ──────────────────────────────────────────────────────────

/// How the OCR engine is invoked for every bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrOptions {
    /// Path or name of the tesseract executable. Default: `tesseract`.
    pub tesseract_cmd: PathBuf,

    /// Language codes joined with `+` on the command line. Default: `rus`, `eng`.
    ///
    /// Reports mix Cyrillic field names with Latin units and reference ranges.
    pub languages: Vec<String>,

    /// `--psm`. Default: 4 (a single column of text of variable sizes), which
    /// keeps the rows of a multi-column results table on one line.
    pub page_segmentation_mode: u8,

    /// `--oem`. Default: 3 (the engine's default/most accurate mode).
    pub engine_mode: u8,

    /// Extra arguments appended verbatim (e.g. `-c preserve_interword_spaces=1`).
    pub extra_args: Vec<String>,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            tesseract_cmd: PathBuf::from("tesseract"),
            languages: vec!["rus".to_string(), "eng".to_string()],
            page_segmentation_mode: 4,
            engine_mode: 3,
            extra_args: Vec::new(),
        }
    }
}

impl OcrOptions {
    /// The `-l` argument, e.g. `rus+eng`.
    pub fn language_arg(&self) -> String {
        self.languages.join("+")
    }
}

// ── Enhancement parameters ───────────────────────────────────────────────

/// Parameters of the fixed enhancement chain applied before OCR.
///
/// Defaults are tuned for scanned lab reports and match the classic
/// OpenCV recipe: 2× bicubic upscale, CLAHE(2.0, 8×8), non-local means
/// (h=30, 7/21), Gaussian adaptive threshold (11, 2), 3×3 close+open,
/// Canny(50, 150) overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhanceParams {
    /// Integer upscale factor in both axes.
    pub scale: u32,
    /// CLAHE clip limit (relative to a uniform histogram).
    pub clahe_clip_limit: f32,
    /// CLAHE tile grid size (tiles per axis).
    pub clahe_tiles: u32,
    /// Non-local means filter strength `h`.
    pub denoise_strength: f32,
    /// Side of the patch compared by the denoiser (odd).
    pub denoise_template: u32,
    /// Side of the search window of the denoiser (odd).
    pub denoise_search: u32,
    /// Side of the Gaussian neighbourhood used for the local threshold (odd, ≥ 3).
    pub threshold_block: u32,
    /// Constant subtracted from the local weighted mean.
    pub threshold_offset: i32,
    /// Side of the square structuring element for close/open (odd).
    pub morph_kernel: u32,
    /// Lower hysteresis threshold of the edge detector.
    pub canny_low: f32,
    /// Upper hysteresis threshold of the edge detector.
    pub canny_high: f32,
}

impl Default for EnhanceParams {
    fn default() -> Self {
        Self {
            scale: 2,
            clahe_clip_limit: 2.0,
            clahe_tiles: 8,
            denoise_strength: 30.0,
            denoise_template: 7,
            denoise_search: 21,
            threshold_block: 11,
            threshold_offset: 2,
            morph_kernel: 3,
            canny_low: 50.0,
            canny_high: 150.0,
        }
    }
}

impl EnhanceParams {
    fn validate(&self) -> Result<(), BloodCountError> {
        let odd = |name: &str, v: u32, min: u32| {
            if v < min || v % 2 == 0 {
                Err(BloodCountError::InvalidConfig(format!(
                    "{name} must be odd and ≥ {min}, got {v}"
                )))
            } else {
                Ok(())
            }
        };
        if self.scale == 0 {
            return Err(BloodCountError::InvalidConfig("Upscale factor must be ≥ 1".into()));
        }
        if self.clahe_tiles == 0 {
            return Err(BloodCountError::InvalidConfig("CLAHE tile grid must be ≥ 1".into()));
        }
        if self.canny_low > self.canny_high {
            return Err(BloodCountError::InvalidConfig(format!(
                "Canny low threshold ({}) exceeds high threshold ({})",
                self.canny_low, self.canny_high
            )));
        }
        odd("Denoise template window", self.denoise_template, 1)?;
        odd("Denoise search window", self.denoise_search, 1)?;
        odd("Threshold block size", self.threshold_block, 3)?;
        odd("Morphology kernel", self.morph_kernel, 1)?;
        Ok(())
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// When a PDF's pages are sent through rasterise → enhance → OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FallbackPolicy {
    /// OCR every page only when the whole document has no embedded text.
    /// A document mixing text and scanned pages keeps its embedded text. (default)
    #[default]
    DocumentWide,
    /// Decide per page: pages with blank embedded text are OCR'd, others are kept.
    PerPage,
}

// ── Field extraction ─────────────────────────────────────────────────────

/// Configuration for the language-model field extractor.
#[derive(Clone)]
pub struct FieldExtractionConfig {
    /// LLM model identifier. If None, uses [`DEFAULT_FIELD_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens in the answer. Default: 100; five short lines fit easily.
    pub max_tokens: usize,

    /// Retries on a failed API call. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom system prompt. If None, uses the built-in one.
    pub system_prompt: Option<String>,
}

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_FIELD_MODEL: &str = "gpt-4.1-nano";

impl Default for FieldExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 100,
            max_retries: 2,
            retry_backoff_ms: 500,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for FieldExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .finish()
    }
}

impl FieldExtractionConfig {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.max_tokens = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_report_recipe() {
        let c = ExtractionConfig::default();
        assert_eq!(c.ocr.language_arg(), "rus+eng");
        assert_eq!(c.ocr.page_segmentation_mode, 4);
        assert_eq!(c.ocr.engine_mode, 3);
        assert_eq!(c.enhance.scale, 2);
        assert_eq!(c.enhance.threshold_block, 11);
        assert_eq!(c.fallback, FallbackPolicy::DocumentWide);
        assert_eq!(c.render_dpi, 72);
    }

    #[test]
    fn builder_rejects_empty_languages() {
        let err = ExtractionConfig::builder()
            .languages(Vec::<String>::new())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("language"));
    }

    #[test]
    fn builder_rejects_even_threshold_block() {
        let params = EnhanceParams {
            threshold_block: 10,
            ..EnhanceParams::default()
        };
        let err = ExtractionConfig::builder().enhance(params).build().unwrap_err();
        assert!(err.to_string().contains("Threshold block"), "got: {err}");
    }

    #[test]
    fn builder_rejects_inverted_canny_thresholds() {
        let params = EnhanceParams {
            canny_low: 200.0,
            canny_high: 100.0,
            ..EnhanceParams::default()
        };
        assert!(ExtractionConfig::builder().enhance(params).build().is_err());
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = ExtractionConfig::builder().render_dpi(5000).build().unwrap();
        assert_eq!(c.render_dpi, 600);
    }

    #[test]
    fn debug_redacts_password() {
        let c = ExtractionConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn field_config_defaults() {
        let c = FieldExtractionConfig::default();
        assert_eq!(c.temperature, 0.2);
        assert_eq!(c.max_tokens, 100);
        assert!(c.provider.is_none());
    }
}

//! OCR: read text from an enhanced page bitmap.
//!
//! Text recognition itself is an external engine. [`OcrEngine`] is the
//! boundary; [`TesseractEngine`] drives the `tesseract` command-line tool,
//! which reads a PNG and prints plain text to stdout.

use crate::config::OcrOptions;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Recognises text in an image file.
///
/// The image handed over is always an enhanced, binarised PNG. Errors are
/// plain messages; the caller attaches the page number.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &Path, options: &OcrOptions) -> Result<String, String>;
}

/// Runs the `tesseract` executable once per page.
#[derive(Debug, Clone, Default)]
pub struct TesseractEngine;

impl TesseractEngine {
    pub fn new() -> Self {
        Self
    }

    /// Command line for one page: `<cmd> <image> stdout -l <langs> --psm N --oem N [extra]`.
    pub fn command(image: &Path, options: &OcrOptions) -> Command {
        let mut cmd = Command::new(&options.tesseract_cmd);
        cmd.arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(options.language_arg())
            .arg("--psm")
            .arg(options.page_segmentation_mode.to_string())
            .arg("--oem")
            .arg(options.engine_mode.to_string())
            .args(&options.extra_args);
        cmd
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &Path, options: &OcrOptions) -> Result<String, String> {
        let output = Self::command(image, options).output().map_err(|e| {
            format!(
                "cannot run '{}': {e}",
                options.tesseract_cmd.display()
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} exited with {}: {}",
                options.tesseract_cmd.display(),
                output.status,
                stderr.trim()
            ));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("OCR produced {} chars", text.chars().count());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn command_line_carries_options() {
        let options = OcrOptions::default();
        let cmd = TesseractEngine::command(Path::new("/tmp/page.png"), &options);
        assert_eq!(cmd.get_program(), OsStr::new("tesseract"));
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            ["/tmp/page.png", "stdout", "-l", "rus+eng", "--psm", "4", "--oem", "3"]
        );
    }

    #[test]
    fn extra_args_are_appended() {
        let options = OcrOptions {
            extra_args: vec!["-c".into(), "preserve_interword_spaces=1".into()],
            ..OcrOptions::default()
        };
        let cmd = TesseractEngine::command(Path::new("p.png"), &options);
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args.last().unwrap(), &OsStr::new("preserve_interword_spaces=1"));
    }

    #[test]
    fn missing_binary_is_an_error() {
        let options = OcrOptions {
            tesseract_cmd: "/nonexistent/tesseract-bin".into(),
            ..OcrOptions::default()
        };
        let err = TesseractEngine::new()
            .recognize(Path::new("page.png"), &options)
            .unwrap_err();
        assert!(err.contains("cannot run"), "got: {err}");
    }
}

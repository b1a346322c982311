//! Input resolution: normalise a user-supplied path or URL to a local file
//! and classify it by extension.
//!
//! URLs are downloaded into a `TempDir` that lives as long as the
//! [`ResolvedInput`], so the file is removed on every exit path. The URL's
//! last path segment is kept as the file name because the extension decides
//! which extraction strategy runs.

use crate::error::FileError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// What kind of document a file is, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    /// `.pdf`: embedded text first, OCR fallback.
    Pdf,
    /// `.png`, `.jpg`, `.jpeg`: always enhanced and OCR'd.
    Image,
}

/// Classify a path by extension (case-insensitive). `None` means unsupported.
pub fn classify(path: &Path) -> Option<DocumentKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(DocumentKind::Pdf),
        "png" | "jpg" | "jpeg" => Some(DocumentKind::Image),
        _ => None,
    }
}

/// File name without directories, for logs and results.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// The resolved input: either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the file lives in a temporary directory.
    /// The `TempDir` is kept alive to prevent cleanup until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Get the path to the file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// File name an input will be reported under, without touching the network.
pub fn input_name(input: &str) -> String {
    if is_url(input) {
        filename_from_url(input)
    } else {
        display_name(Path::new(input))
    }
}

/// Resolve the input string to a local file path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, FileError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input))
    }
}

/// Validate that a local file exists and is readable.
pub fn resolve_local(path: &Path) -> Result<ResolvedInput, FileError> {
    let path = path.to_path_buf();

    if !path.exists() {
        return Err(FileError::NotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(FileError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(FileError::NotFound { path });
        }
    }

    debug!("Resolved local input: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, FileError> {
    info!("Downloading report from: {}", url);

    let failed = |reason: String| FileError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::with_prefix("bloodcount-dl").map_err(|e| failed(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| failed(format!("cannot write temp file: {e}")))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last non-empty path segment of a URL, or `download` when there is none.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }

    "download".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/report.pdf"));
        assert!(is_url("http://example.com/scan.png"));
        assert!(!is_url("/tmp/report.pdf"));
        assert!(!is_url("report.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn classify_by_extension() {
        assert_eq!(classify(Path::new("a/report.pdf")), Some(DocumentKind::Pdf));
        assert_eq!(classify(Path::new("REPORT.PDF")), Some(DocumentKind::Pdf));
        assert_eq!(classify(Path::new("scan.png")), Some(DocumentKind::Image));
        assert_eq!(classify(Path::new("scan.JPG")), Some(DocumentKind::Image));
        assert_eq!(classify(Path::new("scan.jpeg")), Some(DocumentKind::Image));
        assert_eq!(classify(Path::new("notes.txt")), None);
        assert_eq!(classify(Path::new("scan.tiff")), None);
        assert_eq!(classify(Path::new("no_extension")), None);
    }

    #[test]
    fn url_file_name() {
        assert_eq!(filename_from_url("https://lab.example/r/scan_07.jpg"), "scan_07.jpg");
        assert_eq!(filename_from_url("https://lab.example/"), "download");
        assert_eq!(input_name("https://lab.example/a/b.pdf?x=1"), "b.pdf");
        assert_eq!(input_name("/data/in/report.pdf"), "report.pdf");
    }

    #[test]
    fn missing_local_file_is_not_found() {
        let err = resolve_local(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, FileError::NotFound { .. }));
    }

    #[test]
    fn existing_local_file_resolves() {
        let tmp = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        let resolved = resolve_local(tmp.path()).unwrap();
        assert_eq!(resolved.path(), tmp.path());
    }
}

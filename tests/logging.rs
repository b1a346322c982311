//! Failed files are logged at ERROR level under their file name.
//!
//! Kept in its own test binary: it installs a process-wide tracing
//! subscriber so events from tokio's blocking pool are captured too.

use bloodcount::pipeline::render::PageSink;
use bloodcount::{
    DocumentTextExtractor, ExtractionConfig, FileError, OcrEngine, OcrOptions, PdfBackend,
};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// `io::Write` sink shared between the subscriber and the test.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct NeverOcr;

impl OcrEngine for NeverOcr {
    fn recognize(&self, _: &Path, _: &OcrOptions) -> Result<String, String> {
        Err("not expected".into())
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
        _: &mut PageSink<'_>,
    ) -> Result<(), FileError> {
        Ok(())
    }
}

#[tokio::test]
async fn failed_file_is_logged_with_its_name() {
    let captured = Captured::default();
    let writer = captured.clone();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("error"))
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .init();

    let dir = tempfile::tempdir().unwrap();
    let broken = dir.path().join("broken.jpg");
    std::fs::write(&broken, b"definitely not a jpeg").unwrap();

    let extractor = DocumentTextExtractor::with_engines(
        ExtractionConfig::default(),
        Arc::new(NeverOcr),
        Arc::new(NoPdf),
    );
    let report = extractor
        .extract_files([broken.to_string_lossy().into_owned()])
        .await;
    assert_eq!(report.failed, 1);

    let logs = captured.contents();
    let line = logs
        .lines()
        .find(|l| l.contains("ERROR"))
        .unwrap_or_else(|| panic!("no ERROR line in {logs:?}"));
    assert!(line.contains("broken.jpg"), "got: {line}");
}

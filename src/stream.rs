//! Streaming extraction API: emit each file's outcome as soon as it is done.
//!
//! ## Why stream?
//!
//! OCR'ing a scanned report takes seconds per page. A stream lets callers
//! print or forward each report's text immediately, or hand it to the field
//! extractor, instead of waiting for the whole batch.
//!
//! Unlike [`DocumentTextExtractor::extract_files`], which returns only after
//! every file finishes, [`extract_stream`] yields one [`FileOutcome`] per
//! input. Files are still processed one at a time, so outcomes arrive in
//! input order.

use crate::extract::DocumentTextExtractor;
use crate::output::FileOutcome;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-file outcomes.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = FileOutcome> + Send>>;

/// Extract text from every input, yielding outcomes in input order.
///
/// Nothing runs until the stream is polled; dropping the stream stops the
/// batch after the file currently being processed.
///
/// # Example
/// ```rust,no_run
/// use bloodcount::{extract_stream, DocumentTextExtractor, ExtractionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = DocumentTextExtractor::new(ExtractionConfig::default())?;
/// let mut outcomes = extract_stream(extractor, vec!["scan_01.jpg", "report.pdf"]);
/// while let Some(outcome) = outcomes.next().await {
///     match outcome.text() {
///         Some(text) => println!("{}: {} chars", outcome.file_name(), text.len()),
///         None => eprintln!("{}: no text", outcome.file_name()),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn extract_stream<I, S>(extractor: DocumentTextExtractor, inputs: I) -> OutcomeStream
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let inputs: Vec<String> = inputs.into_iter().map(|s| s.as_ref().to_string()).collect();
    info!("Starting streaming extraction: {} files", inputs.len());

    let s = stream::iter(inputs).then(move |input_str| {
        let extractor = extractor.clone();
        async move { extractor.extract_input(&input_str).await }
    });

    Box::pin(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtractionConfig, OcrOptions};
    use crate::error::FileError;
    use crate::pipeline::ocr::OcrEngine;
    use crate::pipeline::render::{PageSink, PdfBackend};
    use std::path::Path;
    use std::sync::Arc;

    struct FixedOcr;

    impl OcrEngine for FixedOcr {
        fn recognize(&self, _: &Path, _: &OcrOptions) -> Result<String, String> {
            Ok("Тромбоциты 306".into())
        }
    }

    struct TextPdf;

    impl PdfBackend for TextPdf {
        fn page_texts(&self, _: &Path, _: Option<&str>) -> Result<Vec<String>, FileError> {
            Ok(vec!["Лейкоциты 7.2".into()])
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
    async fn outcomes_arrive_in_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("a.pdf");
        std::fs::write(&pdf, b"%PDF-1.4").unwrap();
        let txt = dir.path().join("b.txt");
        std::fs::write(&txt, b"notes").unwrap();
        let missing = dir.path().join("c.png");

        let extractor = DocumentTextExtractor::with_engines(
            ExtractionConfig::default(),
            Arc::new(FixedOcr),
            Arc::new(TextPdf),
        );
        let inputs = [&pdf, &txt, &missing].map(|p| p.to_string_lossy().into_owned());
        let outcomes: Vec<FileOutcome> = extract_stream(extractor, inputs).collect().await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].text(), Some("Лейкоциты 7.2"));
        assert!(matches!(outcomes[1], FileOutcome::Skipped { .. }));
        assert!(matches!(
            outcomes[2],
            FileOutcome::Failed {
                error: FileError::NotFound { .. },
                ..
            }
        ));
    }
}

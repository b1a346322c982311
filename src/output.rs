//! Result types produced by text recovery and field extraction.
//!
//! Every input file yields exactly one [`FileOutcome`], so a caller can match
//! outcomes against inputs one-to-one and never has to infer a failure from
//! a missing entry.

use crate::error::FileError;
use crate::pipeline::input::DocumentKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a page's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextSource {
    /// The PDF's own text layer.
    Embedded,
    /// Rasterise (PDF only) → enhance → OCR.
    Ocr,
}

/// Provenance of one page's contribution to the document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 0-based page index. Images are a single page 0.
    pub index: usize,
    pub source: TextSource,
    /// Number of characters this page contributed.
    pub chars: usize,
}

/// Recovered text for one document.
///
/// `text` is exactly the in-order concatenation of the per-page texts listed
/// in `pages`; no separators are inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// File name without directories, as reported in logs.
    pub file_name: String,
    pub kind: DocumentKind,
    pub text: String,
    pub pages: Vec<PageText>,
    pub duration_ms: u64,
}

impl ExtractionResult {
    /// Number of pages whose text came from OCR.
    pub fn ocr_pages(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| p.source == TextSource::Ocr)
            .count()
    }
}

/// The terminal state of one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Text was recovered.
    Succeeded(ExtractionResult),
    /// The file was not processed (unsupported extension). Not an error.
    Skipped { file_name: String, reason: String },
    /// Processing failed; the error is logged and kept here.
    Failed { file_name: String, error: FileError },
}

impl FileOutcome {
    pub fn file_name(&self) -> &str {
        match self {
            FileOutcome::Succeeded(r) => &r.file_name,
            FileOutcome::Skipped { file_name, .. } | FileOutcome::Failed { file_name, .. } => {
                file_name
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FileOutcome::Succeeded(_))
    }

    /// The recovered text, if the file succeeded.
    pub fn text(&self) -> Option<&str> {
        match self {
            FileOutcome::Succeeded(r) => Some(&r.text),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&ExtractionResult> {
        match self {
            FileOutcome::Succeeded(r) => Some(r),
            _ => None,
        }
    }
}

/// Outcomes of a batch, in input order, with per-state counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn from_outcomes(outcomes: Vec<FileOutcome>) -> Self {
        let mut report = BatchReport {
            outcomes: Vec::with_capacity(outcomes.len()),
            ..Default::default()
        };
        for outcome in outcomes {
            report.push(outcome);
        }
        report
    }

    pub fn push(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Succeeded(_) => self.succeeded += 1,
            FileOutcome::Skipped { .. } => self.skipped += 1,
            FileOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Successful results only, in input order.
    pub fn results(&self) -> impl Iterator<Item = &ExtractionResult> {
        self.outcomes.iter().filter_map(FileOutcome::result)
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

// ── Field extraction output ──────────────────────────────────────────────

/// Label → value mapping parsed from the model's `Label: value` answer.
///
/// Keys are whatever labels the model used; nothing is validated here.
pub type FieldMap = BTreeMap<String, String>;

/// Labels the model is asked to produce.
pub const LABEL_GENDER: &str = "Пол";
pub const LABEL_HEMOGLOBIN: &str = "Гемоглобин";
pub const LABEL_ERYTHROCYTES: &str = "Эритроциты";
pub const LABEL_PLATELETS: &str = "Тромбоциты";
pub const LABEL_LEUKOCYTES: &str = "Лейкоциты";

/// The five blood-count fields, typed.
///
/// Missing or non-numeric values become `None`; building this never fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BloodTestFields {
    pub gender: Option<String>,
    /// g/L.
    pub hemoglobin: Option<f64>,
    /// ×10¹²/L.
    pub erythrocytes: Option<f64>,
    /// ×10⁹/L.
    pub platelets: Option<f64>,
    /// ×10⁹/L.
    pub leukocytes: Option<f64>,
}

impl BloodTestFields {
    pub fn from_field_map(map: &FieldMap) -> Self {
        Self {
            gender: lookup(map, LABEL_GENDER)
                .map(str::to_string)
                .filter(|s| !s.is_empty()),
            hemoglobin: lookup(map, LABEL_HEMOGLOBIN).and_then(parse_number),
            erythrocytes: lookup(map, LABEL_ERYTHROCYTES).and_then(parse_number),
            platelets: lookup(map, LABEL_PLATELETS).and_then(parse_number),
            leukocytes: lookup(map, LABEL_LEUKOCYTES).and_then(parse_number),
        }
    }

    /// True when no field could be filled.
    pub fn is_empty(&self) -> bool {
        self.gender.is_none()
            && self.hemoglobin.is_none()
            && self.erythrocytes.is_none()
            && self.platelets.is_none()
            && self.leukocytes.is_none()
    }
}

/// Case-insensitive label lookup; models are inconsistent about capitalisation.
fn lookup<'a>(map: &'a FieldMap, label: &str) -> Option<&'a str> {
    let wanted = label.to_lowercase();
    map.iter()
        .find(|(k, _)| k.trim().to_lowercase() == wanted)
        .map(|(_, v)| v.trim())
}

fn parse_number(value: &str) -> Option<f64> {
    value.replace(',', ".").trim_end_matches('.').parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, text: &str) -> ExtractionResult {
        ExtractionResult {
            file_name: name.into(),
            kind: DocumentKind::Image,
            text: text.into(),
            pages: vec![PageText {
                index: 0,
                source: TextSource::Ocr,
                chars: text.chars().count(),
            }],
            duration_ms: 1,
        }
    }

    #[test]
    fn batch_report_counts_states() {
        let report = BatchReport::from_outcomes(vec![
            FileOutcome::Succeeded(result("a.png", "Гемоглобин 115")),
            FileOutcome::Skipped {
                file_name: "b.txt".into(),
                reason: "unsupported extension".into(),
            },
            FileOutcome::Failed {
                file_name: "c.jpg".into(),
                error: FileError::Internal("boom".into()),
            },
        ]);
        assert_eq!(report.total(), 3);
        assert_eq!((report.succeeded, report.skipped, report.failed), (1, 1, 1));
        assert_eq!(report.results().count(), 1);
        assert_eq!(report.outcomes[1].file_name(), "b.txt");
    }

    #[test]
    fn outcome_serialises_with_status_tag() {
        let o = FileOutcome::Skipped {
            file_name: "notes.txt".into(),
            reason: "unsupported extension".into(),
        };
        let json = serde_json::to_string(&o).unwrap();
        assert!(json.contains(r#""status":"skipped""#), "got: {json}");
    }

    #[test]
    fn typed_fields_from_map() {
        let mut map = FieldMap::new();
        map.insert("Пол".into(), "Мужской".into());
        map.insert("Гемоглобин".into(), "115".into());
        map.insert("эритроциты".into(), "4.52".into());
        map.insert("Тромбоциты".into(), "306".into());
        map.insert("Лейкоциты".into(), "не указано".into());

        let f = BloodTestFields::from_field_map(&map);
        assert_eq!(f.gender.as_deref(), Some("Мужской"));
        assert_eq!(f.hemoglobin, Some(115.0));
        assert_eq!(f.erythrocytes, Some(4.52));
        assert_eq!(f.platelets, Some(306.0));
        assert_eq!(f.leukocytes, None);
        assert!(!f.is_empty());
    }

    #[test]
    fn typed_fields_accept_decimal_comma() {
        let mut map = FieldMap::new();
        map.insert("Лейкоциты".into(), "7,2".into());
        let f = BloodTestFields::from_field_map(&map);
        assert_eq!(f.leukocytes, Some(7.2));
    }

    #[test]
    fn empty_map_gives_empty_fields() {
        assert!(BloodTestFields::from_field_map(&FieldMap::new()).is_empty());
    }

    #[test]
    fn ocr_page_count() {
        let r = result("a.png", "x");
        assert_eq!(r.ocr_pages(), 1);
    }
}

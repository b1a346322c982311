//! Post-processing: turn the model's free-form answer into a [`FieldMap`].
//!
//! ## Why clean before parsing?
//!
//! The model is asked for bare `Label: value` lines, and mostly complies.
//! When it doesn't, the deviations are cosmetic and predictable:
//!
//! - a reasoning preamble wrapped in `<think>…</think>`
//! - the whole answer inside a ` ``` ` fence
//! - list markers or bold markup around the label (`- **Пол:** Мужской`)
//! - Windows line endings and zero-width characters
//!
//! Stripping these first keeps the line parser itself trivial: split at
//! the first colon, keep the leading numeric run of the value if it has one.

use crate::output::FieldMap;
use once_cell::sync::Lazy;
use regex::Regex;

/// Apply the cleanup rules to a raw model answer, in order:
///
/// 1. Drop `<think>…</think>` reasoning blocks
/// 2. Strip an outer code fence
/// 3. Normalise line endings (CRLF → LF)
/// 4. Remove list markers and bold/italic markup at the start of lines
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
pub fn clean_model_response(input: &str) -> String {
    let s = strip_reasoning(input);
    let s = strip_fences(&s);
    let s = normalise_line_endings(&s);
    let s = strip_line_markup(&s);
    remove_invisible_chars(&s)
}

/// Parse `Label: value` lines.
///
/// Lines without a colon contribute nothing. The line is split at its first
/// colon and both halves trimmed. When the value starts with a number, only
/// the number is kept (`115 г/л` → `115`, `7,2 x10^9/л` → `7,2`); otherwise
/// the value is kept verbatim. A label seen twice keeps its last value.
pub fn parse_fields(text: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    for line in text.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        let value = match RE_LEADING_NUMBER.find(value) {
            Some(m) => m.as_str(),
            None => value,
        };
        fields.insert(label.trim().to_string(), value.to_string());
    }
    fields
}

/// Digits and dots, plus one decimal-comma group (`5,1`) as Russian reports write it.
static RE_LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\d.]+(?:,\d+)?").unwrap());

// ── Rule 1: Drop reasoning blocks ────────────────────────────────────────────

static RE_THINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?(?:</think>|$)").unwrap());

fn strip_reasoning(input: &str) -> String {
    RE_THINK.replace_all(input, "").to_string()
}

// ── Rule 2: Strip outer fences ───────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 3: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 4: Strip list markers and emphasis ──────────────────────────────────

static RE_LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:[-*•]|\d+[.)])[ \t]+").unwrap());

fn strip_line_markup(input: &str) -> String {
    let s = RE_LIST_MARKER.replace_all(input, "");
    s.replace("**", "").replace("__", "")
}

// ── Rule 5: Remove invisible characters ──────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' | '\u{00AD}'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_value_keeps_leading_run() {
        let fields = parse_fields("Гемоглобин: 115 г/л");
        assert_eq!(fields.get("Гемоглобин").map(String::as_str), Some("115"));
    }

    #[test]
    fn line_without_colon_is_ignored() {
        let fields = parse_fields("Результаты анализа\nТромбоциты: 306");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["Тромбоциты"], "306");
    }

    #[test]
    fn text_value_is_verbatim() {
        let fields = parse_fields("Пол: Мужской");
        assert_eq!(fields["Пол"], "Мужской");
    }

    #[test]
    fn decimal_value() {
        let fields = parse_fields("Эритроциты: 4.52 x10^12/л");
        assert_eq!(fields["Эритроциты"], "4.52");
    }

    #[test]
    fn decimal_comma_is_part_of_the_number() {
        let fields = parse_fields("Лейкоциты: 7,2 x10^9/л\nТромбоциты: 306, норма");
        assert_eq!(fields["Лейкоциты"], "7,2");
        assert_eq!(fields["Тромбоциты"], "306");
    }

    #[test]
    fn splits_at_first_colon_only() {
        let fields = parse_fields("Лейкоциты: см. примечание: 7");
        assert_eq!(fields["Лейкоциты"], "см. примечание: 7");
    }

    #[test]
    fn later_label_wins() {
        let fields = parse_fields("Пол: М\nПол: Ж");
        assert_eq!(fields["Пол"], "Ж");
    }

    #[test]
    fn full_answer_round() {
        let answer = "Пол: Женский\nГемоглобин: 128\nЭритроциты: 4.1\nТромбоциты: 250\nЛейкоциты: 6.3";
        let fields = parse_fields(answer);
        assert_eq!(fields.len(), 5);
        assert_eq!(fields["Лейкоциты"], "6.3");
    }

    #[test]
    fn strips_reasoning_block() {
        let raw = "<think>\nThe report says 115.\n</think>\nГемоглобин: 115";
        let cleaned = clean_model_response(raw);
        assert!(!cleaned.contains("think"));
        assert_eq!(parse_fields(&cleaned)["Гемоглобин"], "115");
    }

    #[test]
    fn unterminated_reasoning_block_is_dropped() {
        let cleaned = clean_model_response("<think>Пол: ?");
        assert!(parse_fields(&cleaned).is_empty());
    }

    #[test]
    fn strips_outer_fence() {
        let raw = "```\nПол: Мужской\nГемоглобин: 140\n```";
        let fields = parse_fields(&clean_model_response(raw));
        assert_eq!(fields["Пол"], "Мужской");
        assert_eq!(fields["Гемоглобин"], "140");
    }

    #[test]
    fn strips_bullets_and_bold() {
        let raw = "- **Пол:** Мужской\r\n* Тромбоциты: 306\r\n1. Лейкоциты: 5,1";
        let fields = parse_fields(&clean_model_response(raw));
        assert_eq!(fields["Пол"], "Мужской");
        assert_eq!(fields["Тромбоциты"], "306");
        assert_eq!(fields["Лейкоциты"], "5,1");
    }

    #[test]
    fn removes_zero_width_chars() {
        let cleaned = clean_model_response("Пол\u{200B}: М\u{FEFF}");
        assert_eq!(parse_fields(&cleaned)["Пол"], "М");
    }
}

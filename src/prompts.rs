//! Prompts for language-model field extraction.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: adding a field or tightening the answer
//!    format requires editing exactly one place.
//!
//! 2. **Testability**: unit tests can import and inspect prompts directly
//!    without a provider, so prompt regressions are easy to catch.
//!
//! Reports and model answers are in Russian, so the prompts are too; the
//! labels listed in [`ANSWER_TEMPLATE`] are the keys the parser in
//! [`crate::pipeline::postprocess`] will see.
//!
//! Callers can override the system prompt via
//! [`crate::config::FieldExtractionConfig::system_prompt`]; the constants
//! here are used only when no override is provided.

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Ты — помощник, который извлекает значения из текста медицинских анализов и выдаёт их строго в заданном формате.";

/// Opening of the user message, up to and including the expected answer format.
pub const TASK_PREAMBLE: &str = "На вход дан текст, полученный через OCR с результатами медицинского анализа крови.

Восстанови и верни следующую информацию:
- Пол
- Гемоглобин
- Эритроциты
- Тромбоциты
- Лейкоциты

Ответ должен быть в следующем формате:

";

/// One `Label: <значение>` line per requested field.
pub const ANSWER_TEMPLATE: &str = "Пол: <значение>
Гемоглобин: <значение>
Эритроциты: <значение>
Тромбоциты: <значение>
Лейкоциты: <значение>
";

/// Closing instruction, appended after the report text.
pub const ANSWER_RULES: &str = "Ответ должен быть кратким, строго на русском и строго соответствовать указанному формату. Не добавляй комментарии или пояснения.";

/// Build the user message for one report's recovered text.
pub fn build_user_message(report_text: &str) -> String {
    let report = report_text.trim_end();
    let mut msg = String::with_capacity(
        TASK_PREAMBLE.len() + ANSWER_TEMPLATE.len() + report.len() + ANSWER_RULES.len() + 32,
    );
    msg.push_str(TASK_PREAMBLE);
    msg.push_str(ANSWER_TEMPLATE);
    msg.push_str("\nТекст анализа:\n");
    msg.push_str(report);
    msg.push_str("\n\n");
    msg.push_str(ANSWER_RULES);
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{
        LABEL_ERYTHROCYTES, LABEL_GENDER, LABEL_HEMOGLOBIN, LABEL_LEUKOCYTES, LABEL_PLATELETS,
    };
    use crate::pipeline::postprocess::parse_fields;

    #[test]
    fn template_lists_every_label() {
        let labels = parse_fields(ANSWER_TEMPLATE);
        for label in [
            LABEL_GENDER,
            LABEL_HEMOGLOBIN,
            LABEL_ERYTHROCYTES,
            LABEL_PLATELETS,
            LABEL_LEUKOCYTES,
        ] {
            assert!(labels.contains_key(label), "missing {label}");
        }
        assert_eq!(labels.len(), 5);
    }

    #[test]
    fn user_message_embeds_report_between_template_and_rules() {
        let msg = build_user_message("Гемоглобин 115 г/л\n");
        let template_at = msg.find(ANSWER_TEMPLATE).unwrap();
        let report_at = msg.find("Гемоглобин 115 г/л").unwrap();
        let rules_at = msg.find(ANSWER_RULES).unwrap();
        assert!(template_at < report_at && report_at < rules_at);
    }

    #[test]
    fn report_is_separated_from_rules() {
        let msg = build_user_message("Лейкоциты 7.2");
        assert!(msg.contains("Лейкоциты 7.2\n\nОтвет должен"));
    }
}

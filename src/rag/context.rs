//! Context assembly from retrieved validated cases

use std::fmt::Write;

use crate::models::SimilarCase;

/// Longest outcome excerpt quoted per case
const MAX_OUTCOME_CHARS: usize = 600;

/// Assembler for creating prompt context from similar cases
pub struct ContextAssembler {
    max_context_chars: usize,
}

impl ContextAssembler {
    /// Create a new context assembler
    #[must_use]
    pub const fn new(max_context_chars: usize) -> Self {
        Self { max_context_chars }
    }

    /// Assemble context from similar cases, best first
    ///
    /// Stops before the first case that would exceed the budget, so the
    /// context holds a prefix of `cases`.
    #[must_use]
    pub fn assemble(&self, cases: &[SimilarCase]) -> String {
        let mut context = String::new();
        let mut total_chars = 0;

        for (idx, case) in cases.iter().enumerate() {
            let entry = Self::format_case(idx + 1, case);
            let entry_chars = entry.chars().count();

            if total_chars + entry_chars > self.max_context_chars {
                break;
            }

            context.push_str(&entry);
            total_chars += entry_chars;
        }

        context
    }

    fn format_case(position: usize, case: &SimilarCase) -> String {
        format!(
            "\n[Caso {}] (similaridade {:.2}%)\nSintomas: {}\nDesfecho validado: {}\n",
            position,
            case.similarity * 100.0,
            case.metadata.symptoms_text.trim(),
            truncate_chars(case.metadata.outcome_text.trim(), MAX_OUTCOME_CHARS)
        )
    }

    /// Short human-readable list of the retrieved cases
    #[must_use]
    pub fn create_summary(&self, cases: &[SimilarCase]) -> String {
        if cases.is_empty() {
            return "Nenhum caso similar encontrado.".to_string();
        }

        let mut summary = format!("{} caso(s) similar(es):\n", cases.len());
        for (idx, case) in cases.iter().enumerate().take(5) {
            let _ = writeln!(
                summary,
                "{}. {} - similaridade {:.2}%\n   {}",
                idx + 1,
                case.metadata.case_id,
                case.similarity * 100.0,
                truncate_chars(&case.metadata.symptoms_text, 100)
            );
        }
        summary
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(4000)
    }
}

/// First `max_chars` characters, with `...` when cut
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CaseMetadata;

    fn case(id: &str, symptoms: &str, similarity: f32) -> SimilarCase {
        SimilarCase {
            metadata: CaseMetadata {
                case_id: id.to_string(),
                symptoms_text: symptoms.to_string(),
                outcome_text: "CLASSIFICAÇÃO: LARANJA".to_string(),
            },
            similarity,
        }
    }

    #[test]
    fn test_assemble_formats_cases_in_order() {
        let assembler = ContextAssembler::default();
        let context = assembler.assemble(&[
            case("a", "dor torácica", 0.91),
            case("b", "dor no peito", 0.85),
        ]);

        assert!(context.contains("[Caso 1] (similaridade 91.00%)"));
        assert!(context.contains("Sintomas: dor torácica"));
        assert!(context.find("[Caso 1]").unwrap() < context.find("[Caso 2]").unwrap());
    }

    #[test]
    fn test_assemble_respects_budget() {
        let cases = vec![case("a", "x", 0.9), case("b", "y", 0.8)];
        let one_entry = ContextAssembler::format_case(1, &cases[0]).chars().count();

        let assembler = ContextAssembler::new(one_entry);
        let context = assembler.assemble(&cases);
        assert!(context.contains("[Caso 1]"));
        assert!(!context.contains("[Caso 2]"));

        assert!(ContextAssembler::new(0).assemble(&cases).is_empty());
    }

    #[test]
    fn test_summary() {
        let assembler = ContextAssembler::default();
        assert_eq!(assembler.create_summary(&[]), "Nenhum caso similar encontrado.");
        let summary = assembler.create_summary(&[case("c1", "tosse", 0.5)]);
        assert!(summary.starts_with("1 caso(s)"));
        assert!(summary.contains("c1 - similaridade 50.00%"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("ação", 2), "aç...");
        assert_eq!(truncate_chars("ação", 4), "ação");
    }
}

//! Text preprocessing utilities for embedding generation
//!
//! Normalizes and truncates symptom descriptions before they reach the
//! encoder. Every step is a pure function of the input, so the same text
//! always produces the same encoder input.

use tracing::debug;

use crate::errors::Result;
use crate::errors::TriageError;

/// Preprocess text for embedding generation
///
/// - Normalizes whitespace and newlines
/// - Replaces control characters
/// - Truncates to `max_chars` characters, preferring a word boundary
pub fn preprocess_text_for_embedding(text: &str, max_chars: usize) -> Result<String> {
    let sanitized = sanitize_text(&normalize_whitespace(text));

    if sanitized.is_empty() {
        return Err(TriageError::EmbeddingError(
            "Text contains only whitespace after preprocessing".to_string(),
        ));
    }

    let processed = smart_truncate_text(&sanitized, max_chars);
    if processed.len() != sanitized.len() {
        debug!(
            "Truncated embedding input: {} -> {} chars",
            sanitized.chars().count(),
            processed.chars().count()
        );
    }

    Ok(processed)
}

/// Normalize whitespace and newlines
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Replace control characters and collapse the resulting spaces
fn sanitize_text(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Truncate to at most `max_chars` characters
///
/// Cuts at the last space when it falls in the final quarter of the budget,
/// otherwise cuts mid-word. Counts characters, not bytes.
fn smart_truncate_text(text: &str, max_chars: usize) -> String {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };

    let truncated = &text[..cut];
    if let Some(last_space) = truncated.rfind(' ') {
        let boundary_chars = truncated[..last_space].chars().count();
        if boundary_chars > max_chars * 3 / 4 {
            return truncated[..last_space].to_string();
        }
    }

    truncated.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("dor\ntorácica"), "dor torácica");
        assert_eq!(normalize_whitespace("dor\r\ntorácica"), "dor torácica");
        assert_eq!(normalize_whitespace("dor\ttorácica"), "dor torácica");
        assert_eq!(normalize_whitespace("  dor   torácica  "), "dor torácica");
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("febre\x00alta"), "febre alta");
        assert_eq!(sanitize_text("náuseas, vômitos"), "náuseas, vômitos");
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        let text = "ção".repeat(10);
        let result = smart_truncate_text(&text, 5);
        assert_eq!(result.chars().count(), 5);
    }

    #[test]
    fn test_truncate_prefers_word_boundary() {
        let result = smart_truncate_text("febre alta persistente", 13);
        assert_eq!(result, "febre alta");

        // boundary too far back: hard cut
        let result = smart_truncate_text("ab cdefghijklmnopqrstuvwxyz", 10);
        assert_eq!(result, "ab cdefghi");
    }

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(smart_truncate_text("tosse", 100), "tosse");
    }

    #[test]
    fn test_preprocess_is_deterministic() {
        let long = "dor abdominal intensa ".repeat(200);
        let a = preprocess_text_for_embedding(&long, 300).unwrap();
        let b = preprocess_text_for_embedding(&long, 300).unwrap();
        assert_eq!(a, b);
        assert!(a.chars().count() <= 300);
    }

    #[test]
    fn test_preprocess_rejects_blank() {
        assert!(preprocess_text_for_embedding("", 100).is_err());
        assert!(preprocess_text_for_embedding(" \n\t ", 100).is_err());
        assert!(preprocess_text_for_embedding("\x00\x01", 100).is_err());
    }
}

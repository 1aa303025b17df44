//! Structured-response parser
//!
//! Turns free model output into a [`ParsedTriageResult`]. Never fails: missing
//! sections come back empty and a missing or unrecognised tier comes back as
//! [`Classification::Unknown`].
//!
//! A header is recognised at the start of a line, after whitespace, markdown
//! marks (`#`, `*`, `_`) and an optional list number, compared case- and
//! accent-insensitively and followed by `:` or the end of the line. Only the
//! first header of each section counts: a section runs until a header of a
//! section not seen yet, or the end of the text. Recommendations written last,
//! as the prompt asks, therefore run to the end of the text, even when a list
//! item repeats a header word. The three sections may appear in any order.

use tracing::debug;

use crate::models::Classification;
use crate::models::ParsedTriageResult;
use crate::models::UrgencyLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Classification,
    Analysis,
    Recommendations,
}

impl Section {
    const fn slot(self) -> usize {
        match self {
            Self::Classification => 0,
            Self::Analysis => 1,
            Self::Recommendations => 2,
        }
    }
}

/// Folded header spellings; longer aliases of a section come first
const HEADER_ALIASES: &[(Section, &str)] = &[
    (Section::Classification, "CLASSIFICACAO"),
    (Section::Analysis, "ANALISE CLINICA"),
    (Section::Analysis, "JUSTIFICATIVA"),
    (Section::Recommendations, "CONDUTAS RECOMENDADAS"),
    (Section::Recommendations, "CONDUTAS"),
];

#[derive(Debug, Default)]
struct SectionBody<'a> {
    inline: &'a str,
    lines: Vec<&'a str>,
}

impl SectionBody<'_> {
    fn text(&self) -> String {
        let mut parts = Vec::with_capacity(self.lines.len() + 1);
        if !self.inline.is_empty() {
            parts.push(self.inline);
        }
        parts.extend(self.lines.iter().copied());
        parts.join("\n").trim().to_string()
    }

    /// Inline remainder, or the first non-empty line of the section
    fn first_value(&self) -> Option<&str> {
        if !self.inline.is_empty() {
            return Some(self.inline);
        }
        self.lines
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty())
    }
}

/// Parser for triage model output
pub struct ResponseParser;

impl ResponseParser {
    /// Parse raw model output
    #[must_use]
    pub fn parse(raw: &str) -> ParsedTriageResult {
        let mut sections: [Option<SectionBody<'_>>; 3] = [None, None, None];
        let mut current: Option<usize> = None;

        for line in raw.lines() {
            // Only the first header of each section opens it; a repeat is
            // ordinary content of the section being read.
            let opened = match_header(line)
                .filter(|(section, _)| sections[section.slot()].is_none());
            if let Some((section, inline)) = opened {
                let slot = section.slot();
                sections[slot] = Some(SectionBody {
                    inline,
                    lines: Vec::new(),
                });
                current = Some(slot);
                continue;
            }
            if let Some(slot) = current {
                if let Some(body) = sections[slot].as_mut() {
                    body.lines.push(line);
                }
            }
        }

        let classification = sections[Section::Classification.slot()]
            .as_ref()
            .and_then(SectionBody::first_value)
            .map_or(Classification::Unknown, classify);
        let justification = sections[Section::Analysis.slot()]
            .as_ref()
            .map(SectionBody::text)
            .unwrap_or_default();
        let recommendations = sections[Section::Recommendations.slot()]
            .as_ref()
            .map(SectionBody::text)
            .unwrap_or_default();

        debug!(
            "Response parsed: classification={}, justification={} chars, recommendations={} chars",
            classification,
            justification.chars().count(),
            recommendations.chars().count()
        );

        ParsedTriageResult {
            classification,
            justification,
            recommendations,
        }
    }
}

/// First tier keyword found, scanning in priority order
fn classify(value: &str) -> Classification {
    let folded: String = value.chars().map(fold_char).collect();
    UrgencyLevel::PRIORITY_ORDER
        .into_iter()
        .find(|level| folded.contains(level.label()))
        .map_or(Classification::Unknown, Classification::Tier)
}

/// Uppercase and strip Portuguese diacritics
fn fold_char(c: char) -> char {
    let upper = c.to_uppercase().next().unwrap_or(c);
    match upper {
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'Ç' => 'C',
        other => other,
    }
}

/// Strip leading whitespace, markdown marks and a list number like `1.` or `2)`
fn strip_line_prefix(line: &str) -> &str {
    let is_mark = |c: char| c.is_whitespace() || matches!(c, '#' | '*' | '_' | '>');
    let line = line.trim_start_matches(is_mark);

    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        let after = &line[digits..];
        if let Some(rest) = after.strip_prefix('.').or_else(|| after.strip_prefix(')')) {
            return rest.trim_start_matches(is_mark);
        }
    }
    line
}

/// Byte length of the prefix of `text` matching `alias` after folding
fn folded_prefix_len(text: &str, alias: &str) -> Option<usize> {
    let mut chars = text.char_indices();
    for expected in alias.chars() {
        let (_, c) = chars.next()?;
        if fold_char(c) != expected {
            return None;
        }
    }
    Some(chars.next().map_or(text.len(), |(idx, _)| idx))
}

/// Header at the start of `line`, with the text following it on that line
fn match_header(line: &str) -> Option<(Section, &str)> {
    let text = strip_line_prefix(line);
    let is_emphasis = |c: char| matches!(c, '*' | '_');

    for &(section, alias) in HEADER_ALIASES {
        let Some(len) = folded_prefix_len(text, alias) else {
            continue;
        };
        let rest = text[len..].trim_start_matches(is_emphasis).trim_end();
        if rest.is_empty() {
            return Some((section, ""));
        }
        if let Some(inline) = rest.strip_prefix(':') {
            let inline = inline
                .trim_matches(|c: char| c.is_whitespace() || is_emphasis(c))
                .trim();
            return Some((section, inline));
        }
    }
    None
}

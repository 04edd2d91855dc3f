//! Amendment-submission splitting and grouping.
//!
//! A submission is first cut into discrete instructions on list markers and
//! opening imperative verbs, then grouped by the article each block of text
//! addresses. Grouping slices the submission at the first mention of each
//! article number, so every group carries all its edits as one block and
//! preamble text attaches to the first group.

use crate::refs::ReferenceExtractor;
use regex::Regex;

/// A block of submission text addressed to one article (or to none).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionGroup {
    /// Article number the block references; None when no reference was found.
    pub unit_number: Option<String>,
    pub text: String,
}

pub struct InstructionSplitter {
    markers: Vec<Regex>,
    refs: ReferenceExtractor,
}

impl Default for InstructionSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionSplitter {
    pub fn new() -> Self {
        let markers = vec![
            // Numbered lists: "1. ", "2) "
            Regex::new(r"^\d+[.)]\s*").expect("fixed pattern"),
            // Lettered lists: "а) ", "б) "
            Regex::new(r"^[а-яё]\)\s*").expect("fixed pattern"),
            // Bullets
            Regex::new(r"^[-•]\s*").expect("fixed pattern"),
            // Imperative verbs that open an instruction
            Regex::new(r"(?i)^(в\s+стать|исключить|дополнить|заменить|изложить|внести|признать)")
                .expect("fixed pattern"),
        ];
        Self {
            markers,
            refs: ReferenceExtractor::new(),
        }
    }

    pub fn reference_extractor(&self) -> &ReferenceExtractor {
        &self.refs
    }

    /// Cut a submission into independently actionable instructions.
    ///
    /// Marker lines open a new instruction; other lines continue the current
    /// one. With no markers anywhere the text is split on blank-line
    /// paragraphs, and failing that the whole submission is one instruction.
    pub fn split(&self, text: &str) -> Vec<String> {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let any_marker = lines.iter().any(|l| self.is_marker(l));
        if !any_marker {
            let paragraphs: Vec<String> = text
                .split("\n\n")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
            if paragraphs.is_empty() {
                return vec![text.trim().to_string()];
            }
            return paragraphs;
        }

        let mut instructions = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for line in lines {
            if self.is_marker(line) && !current.is_empty() {
                instructions.push(current.join("\n"));
                current.clear();
            }
            current.push(line);
        }
        if !current.is_empty() {
            instructions.push(current.join("\n"));
        }
        instructions
    }

    /// Group a submission by the article numbers it references.
    ///
    /// The text is sliced at the first occurrence of each referenced number,
    /// in text order; the slice before the first reference belongs to the
    /// first group. A submission referencing no article at all becomes a
    /// single unaddressed group.
    pub fn group_by_unit(&self, text: &str) -> Vec<InstructionGroup> {
        let occurrences = self.refs.occurrences(text);
        if occurrences.is_empty() {
            return vec![InstructionGroup {
                unit_number: None,
                text: text.trim().to_string(),
            }];
        }

        let mut groups = Vec::with_capacity(occurrences.len());
        for (i, (pos, number)) in occurrences.iter().enumerate() {
            let start = if i == 0 { 0 } else { *pos };
            let end = occurrences
                .get(i + 1)
                .map(|(next, _)| *next)
                .unwrap_or(text.len());
            groups.push(InstructionGroup {
                unit_number: Some(number.clone()),
                text: text[start..end].trim().to_string(),
            });
        }
        groups
    }

    fn is_marker(&self, line: &str) -> bool {
        self.markers.iter().any(|m| m.is_match(line))
    }
}

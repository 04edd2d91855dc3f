//! Structural document parser.
//!
//! Scans the document line by line, classifying each non-blank line against
//! an ordered set of heading patterns (section / chapter / article / clause /
//! sub-clause). A heading closes the currently accumulating unit; unmatched
//! lines become body content of the open unit. The parser never fails: a
//! document with no recognizable headings becomes a single synthetic unit
//! covering the whole text.

use lexforge_model::UnitType;
use regex::Regex;

/// Breadcrumb components are joined with this separator.
pub const BREADCRUMB_SEPARATOR: &str = " / ";

/// Title and breadcrumb of the synthetic whole-document fallback unit.
pub const WHOLE_DOCUMENT_TITLE: &str = "Весь документ";

/// Publisher service lines dropped before classification.
const SERVICE_MARKERS: [&str; 4] = ["консультантплюс", "consultantplus", "©", "copyright"];

/// One structural unit as produced by the parser. `parent` is an index into
/// the returned vector (arena style); the store assigns real ids at import.
#[derive(Debug, Clone)]
pub struct ParsedUnit {
    pub unit_type: UnitType,
    pub parent: Option<usize>,
    /// Article/chapter/clause number when the heading carried one.
    pub unit_number: Option<String>,
    pub title: String,
    pub breadcrumb_path: String,
    pub ordinal: u32,
    /// Body text including the heading line itself.
    pub content: String,
}

pub struct StructuralParser {
    section: Regex,
    chapter: Regex,
    article: Regex,
    clause: Regex,
    sub_clause: Regex,
}

/// Outcome of classifying one line.
struct Heading {
    unit_type: UnitType,
    /// Breadcrumb component, source casing preserved.
    label: String,
    number: Option<String>,
    title: String,
}

impl Default for StructuralParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuralParser {
    pub fn new() -> Self {
        // Patterns are anchored at line start and case-insensitive. Order
        // matters: the article pattern must win before the clause pattern
        // sees the line.
        Self {
            section: Regex::new(r"(?i)^(раздел\s+[IVXLC]+)\b").expect("fixed pattern"),
            chapter: Regex::new(r"(?i)^(глава\s+(\d+(?:\.\d+)?))\b").expect("fixed pattern"),
            article: Regex::new(r"(?i)^(статья\s+(\d+(?:\.\d+)?))\.?\s*(.*)$")
                .expect("fixed pattern"),
            clause: Regex::new(r"^(\d+(?:\.\d+)?)[.)]\s").expect("fixed pattern"),
            sub_clause: Regex::new(r"^([а-яё])\)\s").expect("fixed pattern"),
        }
    }

    /// Segment `text` into an ordered unit list. Never fails; worst case is
    /// one synthetic unit holding the entire input.
    pub fn parse(&self, text: &str) -> Vec<ParsedUnit> {
        let mut units: Vec<ParsedUnit> = Vec::new();
        let mut breadcrumbs: Vec<(UnitType, String)> = Vec::new();

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || is_service_line(line) {
                continue;
            }

            match self.classify(line) {
                Some(heading) => {
                    // Keep only strictly shallower levels. The stack holds
                    // the levels actually present, so truncation must be
                    // depth-relative, not positional: a sibling at the same
                    // level replaces its predecessor even when upper levels
                    // are absent.
                    let depth = heading.unit_type.depth();
                    breadcrumbs.retain(|(level, _)| level.depth() < depth);
                    breadcrumbs.push((heading.unit_type, heading.label));

                    let parent = heading
                        .unit_type
                        .parent_type()
                        .and_then(|want| nearest_of_type(&units, want));

                    units.push(ParsedUnit {
                        unit_type: heading.unit_type,
                        parent,
                        unit_number: heading.number,
                        title: heading.title,
                        breadcrumb_path: join_breadcrumbs(&breadcrumbs),
                        ordinal: units.len() as u32,
                        content: line.to_string(),
                    });
                }
                None => {
                    // Body line of the currently open unit; lines before the
                    // first heading are dropped with the fallback below as
                    // the only exception.
                    if let Some(open) = units.last_mut() {
                        open.content.push('\n');
                        open.content.push_str(line);
                    }
                }
            }
        }

        if units.is_empty() {
            tracing::debug!("no headings recognized, falling back to single unit");
            units.push(ParsedUnit {
                unit_type: UnitType::Article,
                parent: None,
                unit_number: None,
                title: WHOLE_DOCUMENT_TITLE.to_string(),
                breadcrumb_path: WHOLE_DOCUMENT_TITLE.to_string(),
                ordinal: 0,
                content: text.trim().to_string(),
            });
        }

        units
    }

    fn classify(&self, line: &str) -> Option<Heading> {
        if let Some(caps) = self.section.captures(line) {
            return Some(Heading {
                unit_type: UnitType::Section,
                label: caps[1].to_string(),
                number: None,
                title: line.to_string(),
            });
        }
        if let Some(caps) = self.chapter.captures(line) {
            return Some(Heading {
                unit_type: UnitType::Chapter,
                label: caps[1].to_string(),
                number: Some(caps[2].to_string()),
                title: line.to_string(),
            });
        }
        if let Some(caps) = self.article.captures(line) {
            let rest = caps[3].trim().to_string();
            return Some(Heading {
                unit_type: UnitType::Article,
                label: caps[1].to_string(),
                number: Some(caps[2].to_string()),
                title: if rest.is_empty() { line.to_string() } else { rest },
            });
        }
        if let Some(caps) = self.clause.captures(line) {
            return Some(Heading {
                unit_type: UnitType::Clause,
                label: truncate_label(line),
                number: Some(caps[1].to_string()),
                title: line.to_string(),
            });
        }
        if self.sub_clause.is_match(line) {
            return Some(Heading {
                unit_type: UnitType::SubClause,
                label: truncate_label(line),
                number: None,
                title: line.to_string(),
            });
        }
        None
    }
}

fn is_service_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    SERVICE_MARKERS.iter().any(|m| lower.contains(m))
}

fn nearest_of_type(units: &[ParsedUnit], want: UnitType) -> Option<usize> {
    units.iter().rposition(|u| u.unit_type == want)
}

fn join_breadcrumbs(stack: &[(UnitType, String)]) -> String {
    stack
        .iter()
        .map(|(_, label)| label.as_str())
        .collect::<Vec<_>>()
        .join(BREADCRUMB_SEPARATOR)
}

/// Clause headings use the line itself as a breadcrumb component, capped at
/// 50 characters.
fn truncate_label(line: &str) -> String {
    line.chars().take(50).collect()
}

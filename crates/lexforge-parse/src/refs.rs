//! Inflection-tolerant extraction of structural references.
//!
//! Amendment text refers to articles in any grammatical case and number
//! ("в статье 6.1", "дополнить статью 11.3", "абзац статьи 5") and through
//! the "ст." abbreviation. Matching uses a fixed list of inflected forms
//! rather than stemming; the form list is closed and small.

use regex::Regex;

/// Every declension of "статья" the extractor recognizes.
const ARTICLE_FORMS: [&str; 9] = [
    "статья", "статьи", "статье", "статью", "статьей", "статьёй", "статьею", "статьях", "статей",
];

/// Extracts article-number tokens ("1", "11.3") from free text.
#[derive(Debug, Clone)]
pub struct ReferenceExtractor {
    keyword: Regex,
    abbreviated: Regex,
}

impl Default for ReferenceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceExtractor {
    pub fn new() -> Self {
        let forms = ARTICLE_FORMS.join("|");
        let keyword = Regex::new(&format!(r"(?i)\b(?:{})\s+(\d+(?:\.\d+)?)", forms))
            .expect("article keyword pattern is fixed");
        let abbreviated =
            Regex::new(r"(?i)\bст\.\s*(\d+(?:\.\d+)?)").expect("abbreviation pattern is fixed");
        Self {
            keyword,
            abbreviated,
        }
    }

    /// Byte offset and number of every reference, in text order. A number
    /// mentioned more than once is reported at its first occurrence only.
    pub fn occurrences(&self, text: &str) -> Vec<(usize, String)> {
        let mut found: Vec<(usize, String)> = Vec::new();
        for caps in self
            .keyword
            .captures_iter(text)
            .chain(self.abbreviated.captures_iter(text))
        {
            let number = caps[1].to_string();
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            match found.iter_mut().find(|(_, n)| *n == number) {
                Some(entry) if start < entry.0 => entry.0 = start,
                Some(_) => {}
                None => found.push((start, number)),
            }
        }
        found.sort_by_key(|(pos, _)| *pos);
        found
    }

    /// The first article number referenced in `text`, if any.
    pub fn first_number(&self, text: &str) -> Option<String> {
        self.occurrences(text).into_iter().next().map(|(_, n)| n)
    }
}

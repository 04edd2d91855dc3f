//! Unit registries: how amendment addresses find units
//!
//! A registry is built per document from its unit rows and answers two
//! questions: which unit does article number N denote, and what candidate
//! labels should the address oracle choose between. The two addressing modes
//! differ in how strong an exact number hit is:
//! - flat documents key articles directly by number, so a hit is final
//! - hierarchical documents match the number inside breadcrumb paths, a
//!   weaker signal that still goes through user review

use std::collections::HashMap;

use lexforge_model::{MatchSource, StructuralUnit, TargetStatus, UnitId, UnitType};

pub trait UnitRegistry: Send + Sync {
    /// Unit denoted by an article number, with the kind of evidence the hit
    /// rests on.
    fn lookup_number(&self, number: &str) -> Option<(UnitId, MatchSource)>;

    /// Labels offered to the address oracle.
    fn candidates(&self) -> Vec<String>;

    /// Unit behind one of the [`candidates`](Self::candidates) labels.
    fn by_candidate(&self, label: &str) -> Option<UnitId>;

    /// Status a freshly resolved target gets for a given evidence kind.
    fn status_for(&self, source: MatchSource) -> TargetStatus;
}

// ============================================================================
// Flat registry
// ============================================================================

/// Article-number-keyed registry for flat documents.
pub struct FlatRegistry {
    by_number: HashMap<String, UnitId>,
    numbers: Vec<String>,
}

impl FlatRegistry {
    pub fn build(units: &[StructuralUnit]) -> Self {
        let mut by_number = HashMap::new();
        let mut numbers = Vec::new();
        for unit in units {
            if unit.unit_type != UnitType::Article {
                continue;
            }
            if let Some(number) = &unit.unit_number {
                if by_number.insert(number.clone(), unit.id).is_none() {
                    numbers.push(number.clone());
                }
            }
        }
        Self { by_number, numbers }
    }
}

impl UnitRegistry for FlatRegistry {
    fn lookup_number(&self, number: &str) -> Option<(UnitId, MatchSource)> {
        self.by_number
            .get(number)
            .map(|id| (*id, MatchSource::ExactNumber))
    }

    fn candidates(&self) -> Vec<String> {
        self.numbers.clone()
    }

    fn by_candidate(&self, label: &str) -> Option<UnitId> {
        self.by_number.get(label).copied()
    }

    fn status_for(&self, source: MatchSource) -> TargetStatus {
        match source {
            MatchSource::ExactNumber | MatchSource::Oracle | MatchSource::Manual => {
                TargetStatus::Pending
            }
            _ => TargetStatus::NeedsReview,
        }
    }
}

// ============================================================================
// Breadcrumb registry
// ============================================================================

/// Breadcrumb-matching registry for hierarchical documents.
pub struct BreadcrumbRegistry {
    units: Vec<(UnitId, String)>,
}

impl BreadcrumbRegistry {
    pub fn build(units: &[StructuralUnit]) -> Self {
        Self {
            units: units
                .iter()
                .map(|u| (u.id, u.breadcrumb_path.clone()))
                .collect(),
        }
    }

    /// Whether a breadcrumb path names exactly this article number. Substring
    /// search with a boundary check so "статья 1" does not hit "Статья 11".
    fn path_names_article(path: &str, number: &str) -> bool {
        let haystack = path.to_lowercase();
        let needle = format!("статья {}", number.to_lowercase());
        let mut from = 0;
        while let Some(at) = haystack[from..].find(&needle) {
            let end = from + at + needle.len();
            let boundary = haystack[end..]
                .chars()
                .next()
                .map(|c| !c.is_ascii_digit() && c != '.')
                .unwrap_or(true);
            if boundary {
                return true;
            }
            from = end;
        }
        false
    }
}

impl UnitRegistry for BreadcrumbRegistry {
    fn lookup_number(&self, number: &str) -> Option<(UnitId, MatchSource)> {
        self.units
            .iter()
            .find(|(_, path)| Self::path_names_article(path, number))
            .map(|(id, _)| (*id, MatchSource::Breadcrumb))
    }

    fn candidates(&self) -> Vec<String> {
        self.units.iter().map(|(_, path)| path.clone()).collect()
    }

    fn by_candidate(&self, label: &str) -> Option<UnitId> {
        self.units
            .iter()
            .find(|(_, path)| path == label)
            .map(|(id, _)| *id)
    }

    fn status_for(&self, source: MatchSource) -> TargetStatus {
        match source {
            MatchSource::Manual => TargetStatus::Pending,
            _ => TargetStatus::NeedsReview,
        }
    }
}

/// Build the registry matching a document's addressing mode.
pub fn registry_for(
    addressing: lexforge_model::AddressingMode,
    units: &[StructuralUnit],
) -> Box<dyn UnitRegistry> {
    match addressing {
        lexforge_model::AddressingMode::Flat => Box::new(FlatRegistry::build(units)),
        lexforge_model::AddressingMode::Hierarchical => Box::new(BreadcrumbRegistry::build(units)),
    }
}

//! Core entity types for the Lexforge amendment pipeline
//!
//! The pipeline moves a legal document through four stages:
//! - import: raw text → [`StructuralUnit`] tree
//! - resolution: amendment text → [`EditTarget`]s bound to units
//! - application: confirmed targets → before/after [`Fragment`]s
//! - commit: fragments → an immutable [`Snapshot`] of [`UnitVersion`]s
//!
//! Entities here are plain serde-serializable rows. All relational
//! behaviour (locking, cascades, transactions) lives in `lexforge-store`;
//! all state transitions live in `lexforge-pipeline`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod audit;

pub use audit::{AuditAction, AuditRecord};

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(DocumentId);
id_newtype!(UnitId);
id_newtype!(SubmissionId);
id_newtype!(TargetId);
id_newtype!(FragmentId);
id_newtype!(SnapshotId);
id_newtype!(VersionId);

/// Background job identifier (resolution/application runs).
pub type JobId = uuid::Uuid;

// ============================================================================
// Documents and structural units
// ============================================================================

/// Declared format of an imported document. Rich-text extraction happens
/// upstream; by the time text reaches the parser it is plain paragraphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    PlainText,
    RichText,
}

/// How amendment addresses are matched against this document's units.
///
/// `Flat` keys units by their article number and treats an exact number hit
/// as confirmed. `Hierarchical` matches against breadcrumb paths, which is a
/// weaker signal, so exact hits still go through review. One mode is chosen
/// per document at import; there is no live migration between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressingMode {
    Flat,
    Hierarchical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    pub source_format: SourceFormat,
    pub addressing: AddressingMode,
    pub imported_at: DateTime<Utc>,
}

/// Level of a structural unit within the document hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    Section,
    Chapter,
    Article,
    Clause,
    SubClause,
}

impl UnitType {
    /// Depth of this level in the breadcrumb stack (section = 0).
    pub fn depth(self) -> usize {
        match self {
            UnitType::Section => 0,
            UnitType::Chapter => 1,
            UnitType::Article => 2,
            UnitType::Clause => 3,
            UnitType::SubClause => 4,
        }
    }

    /// The level whose most recent unit becomes this unit's parent.
    pub fn parent_type(self) -> Option<UnitType> {
        match self {
            UnitType::Section => None,
            UnitType::Chapter => Some(UnitType::Section),
            UnitType::Article => Some(UnitType::Chapter),
            UnitType::Clause => Some(UnitType::Article),
            UnitType::SubClause => Some(UnitType::Clause),
        }
    }
}

/// An addressable segment of the source document.
///
/// Units are created at import and never mutated afterwards; edited content
/// lives in [`UnitVersion`] rows, with `current_version_id` advanced by each
/// snapshot commit. `initial_content` holds the text as imported (the very
/// first version).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralUnit {
    pub id: UnitId,
    pub document_id: DocumentId,
    pub unit_type: UnitType,
    /// Parent in the unit tree; None for top-level units and for units whose
    /// parent chain was broken in the source text.
    pub parent_id: Option<UnitId>,
    /// Article number ("1", "11.3") when the unit carries one; the flat
    /// addressing mode keys on this.
    pub unit_number: Option<String>,
    pub title: String,
    /// Materialized ancestor chain, e.g. "Раздел I / Глава 1 / Статья 6.1".
    pub breadcrumb_path: String,
    /// Position in document order.
    pub ordinal: u32,
    pub initial_content: String,
    pub current_version_id: Option<VersionId>,
}

// ============================================================================
// Submissions and edit targets
// ============================================================================

/// A raw amendment submission. Immutable once created; owns its targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditSubmission {
    pub id: SubmissionId,
    pub document_id: DocumentId,
    pub raw_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Resolved and ready to apply.
    Pending,
    /// Unresolved, or resolved through a weak signal; needs user confirmation.
    NeedsReview,
    /// A fragment has been produced for this target.
    Completed,
    /// The oracle call for this target failed.
    Failed,
}

/// How a target's unit binding was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    /// Exact article-number hit in a flat registry.
    ExactNumber,
    /// Breadcrumb substring hit in a hierarchical registry.
    Breadcrumb,
    /// Returned by the address-matching oracle and verified against the
    /// candidate list.
    Oracle,
    /// Assigned by the user.
    Manual,
    Unresolved,
}

/// Resolution provenance kept on every target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionMeta {
    pub source: MatchSource,
    pub confidence: f32,
    /// The address string as written in the submission, when one was found.
    pub address: Option<String>,
    /// Why resolution failed or was downgraded to review.
    pub reason: Option<String>,
}

impl ResolutionMeta {
    pub fn unresolved(reason: impl Into<String>) -> Self {
        Self {
            source: MatchSource::Unresolved,
            confidence: 0.0,
            address: None,
            reason: Some(reason.into()),
        }
    }
}

/// A single amendment instruction bound (or pending binding) to a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditTarget {
    pub id: TargetId,
    pub submission_id: SubmissionId,
    pub instruction_text: String,
    /// Sha-256 of the whitespace-normalized instruction text. Unique per
    /// submission; this is the dedup key for retried resolution runs.
    pub instruction_digest: String,
    pub resolved_unit_id: Option<UnitId>,
    pub status: TargetStatus,
    pub resolution: ResolutionMeta,
}

// ============================================================================
// Fragments, snapshots, versions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

/// The before/after pair produced by applying one target. At most one per
/// target; replaced only through force-reapply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub id: FragmentId,
    pub target_id: TargetId,
    pub unit_id: UnitId,
    pub before_text: String,
    pub after_text: String,
    pub change_type: ChangeType,
    /// The transform oracle reported it could not locate the text to change
    /// (its reply carried the reserved failure marker).
    pub oracle_failed: bool,
    /// Set when a snapshot commit has consumed this fragment.
    pub committed: bool,
}

/// An immutable, named commit of unit versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub document_id: DocumentId,
    pub created_at: DateTime<Utc>,
    pub comment: String,
}

/// One unit's content as of one snapshot. A unit's current content is its
/// latest version across all snapshots, falling back to the imported text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitVersion {
    pub id: VersionId,
    pub snapshot_id: SnapshotId,
    pub unit_id: UnitId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Instruction normalization
// ============================================================================

/// Collapse whitespace runs so that textually-equivalent instructions compare
/// equal regardless of line wrapping.
pub fn normalize_instruction(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Dedup key for an instruction: sha-256 over the normalized text, hex.
pub fn instruction_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_instruction(text).as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_whitespace() {
        assert_eq!(
            normalize_instruction("  в статье 2\n\t слова  'старое' "),
            "в статье 2 слова 'старое'"
        );
    }

    #[test]
    fn digest_ignores_line_wrapping() {
        let a = instruction_digest("в статье 2 слова 'старое' заменить");
        let b = instruction_digest("в статье 2\nслова 'старое'\nзаменить");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn digest_distinguishes_different_instructions() {
        assert_ne!(
            instruction_digest("исключить пункт 3"),
            instruction_digest("исключить пункт 4")
        );
    }

    #[test]
    fn parent_chain_is_closed() {
        let mut level = UnitType::SubClause;
        let mut depth = level.depth();
        while let Some(parent) = level.parent_type() {
            assert_eq!(parent.depth() + 1, depth);
            level = parent;
            depth = level.depth();
        }
        assert_eq!(level, UnitType::Section);
    }
}

//! Transactional in-memory store for the amendment pipeline
//!
//! Relational behaviour the entities rely on lives here:
//! - per-submission row locks for the resolution dedup window
//! - the unique instruction-digest index within a submission
//! - the one-fragment-per-target rule and force-reapply replacement
//! - all-or-nothing snapshot commits
//! - cascading deletes down the unit tree and across a document
//!
//! Every public operation takes and releases the table lock internally, so a
//! [`Store`] behind an `Arc` is safe to share across tasks. Callers that need
//! a wider critical section (the resolver's check-then-insert) serialize on
//! [`Store::submission_lock`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use lexforge_model::{
    instruction_digest, AddressingMode, AuditAction, AuditRecord, ChangeType, Document,
    DocumentId, EditSubmission, EditTarget, Fragment, FragmentId, ResolutionMeta, Snapshot,
    SnapshotId, SourceFormat, StructuralUnit, SubmissionId, TargetId, TargetStatus, UnitId,
    UnitType, UnitVersion, VersionId,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

pub mod error;

pub use error::{StoreError, StoreResult};

// ============================================================================
// Row parameter structs
// ============================================================================

/// Unit row as produced by import, before the store assigns its id.
#[derive(Debug, Clone)]
pub struct NewUnit {
    pub document_id: DocumentId,
    pub unit_type: UnitType,
    pub parent_id: Option<UnitId>,
    pub unit_number: Option<String>,
    pub title: String,
    pub breadcrumb_path: String,
    pub ordinal: u32,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct NewTarget {
    pub submission_id: SubmissionId,
    pub instruction_text: String,
    pub resolved_unit_id: Option<UnitId>,
    pub status: TargetStatus,
    pub resolution: ResolutionMeta,
}

#[derive(Debug, Clone)]
pub struct NewFragment {
    pub target_id: TargetId,
    pub unit_id: UnitId,
    pub before_text: String,
    pub after_text: String,
    pub change_type: ChangeType,
    pub oracle_failed: bool,
}

// ============================================================================
// Tables
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    documents: BTreeMap<u64, Document>,
    units: BTreeMap<u64, StructuralUnit>,
    submissions: BTreeMap<u64, EditSubmission>,
    targets: BTreeMap<u64, EditTarget>,
    fragments: BTreeMap<u64, Fragment>,
    snapshots: BTreeMap<u64, Snapshot>,
    versions: BTreeMap<u64, UnitVersion>,
    audit: Vec<AuditRecord>,
    next_id: u64,
}

impl Tables {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, action: AuditAction, entity_kind: &str, entity_id: u64) {
        let id = self.next();
        self.audit.push(AuditRecord {
            id,
            action,
            entity_kind: entity_kind.to_string(),
            entity_id,
            created_at: Utc::now(),
        });
    }
}

// ============================================================================
// Store
// ============================================================================

pub struct Store {
    tables: RwLock<Tables>,
    submission_locks: Mutex<HashMap<SubmissionId, Arc<Mutex<()>>>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            submission_locks: Mutex::new(HashMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // Documents and units
    // ------------------------------------------------------------------

    pub fn create_document(
        &self,
        name: &str,
        source_format: SourceFormat,
        addressing: AddressingMode,
    ) -> Document {
        let mut t = self.tables.write();
        let id = DocumentId(t.next());
        let doc = Document {
            id,
            name: name.to_string(),
            source_format,
            addressing,
            imported_at: Utc::now(),
        };
        t.documents.insert(id.0, doc.clone());
        t.record(AuditAction::Import, "document", id.0);
        doc
    }

    pub fn document(&self, id: DocumentId) -> StoreResult<Document> {
        self.tables
            .read()
            .documents
            .get(&id.0)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "document",
                id: id.0,
            })
    }

    pub fn documents(&self) -> Vec<Document> {
        self.tables.read().documents.values().cloned().collect()
    }

    pub fn insert_unit(&self, new: NewUnit) -> StoreResult<StructuralUnit> {
        let mut t = self.tables.write();
        if !t.documents.contains_key(&new.document_id.0) {
            return Err(StoreError::NotFound {
                entity: "document",
                id: new.document_id.0,
            });
        }
        let id = UnitId(t.next());
        let unit = StructuralUnit {
            id,
            document_id: new.document_id,
            unit_type: new.unit_type,
            parent_id: new.parent_id,
            unit_number: new.unit_number,
            title: new.title,
            breadcrumb_path: new.breadcrumb_path,
            ordinal: new.ordinal,
            initial_content: new.content,
            current_version_id: None,
        };
        t.units.insert(id.0, unit.clone());
        Ok(unit)
    }

    pub fn unit(&self, id: UnitId) -> StoreResult<StructuralUnit> {
        self.tables
            .read()
            .units
            .get(&id.0)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "unit",
                id: id.0,
            })
    }

    /// Units of a document in document order.
    pub fn units_for_document(&self, document_id: DocumentId) -> Vec<StructuralUnit> {
        let t = self.tables.read();
        let mut units: Vec<_> = t
            .units
            .values()
            .filter(|u| u.document_id == document_id)
            .cloned()
            .collect();
        units.sort_by_key(|u| u.ordinal);
        units
    }

    /// A unit's effective content: latest committed version, else as imported.
    pub fn current_text(&self, unit_id: UnitId) -> StoreResult<String> {
        let t = self.tables.read();
        let unit = t.units.get(&unit_id.0).ok_or(StoreError::NotFound {
            entity: "unit",
            id: unit_id.0,
        })?;
        match unit.current_version_id {
            Some(vid) => t
                .versions
                .get(&vid.0)
                .map(|v| v.content.clone())
                .ok_or(StoreError::NotFound {
                    entity: "version",
                    id: vid.0,
                }),
            None => Ok(unit.initial_content.clone()),
        }
    }

    /// Full version history of a unit, oldest first.
    pub fn versions_for_unit(&self, unit_id: UnitId) -> Vec<UnitVersion> {
        let t = self.tables.read();
        t.versions
            .values()
            .filter(|v| v.unit_id == unit_id)
            .cloned()
            .collect()
    }

    /// Drop a document and every row that hangs off it.
    pub fn delete_document(&self, id: DocumentId) -> StoreResult<()> {
        let mut t = self.tables.write();
        if t.documents.remove(&id.0).is_none() {
            return Err(StoreError::NotFound {
                entity: "document",
                id: id.0,
            });
        }
        let unit_ids: Vec<u64> = t
            .units
            .values()
            .filter(|u| u.document_id == id)
            .map(|u| u.id.0)
            .collect();
        let submission_ids: Vec<u64> = t
            .submissions
            .values()
            .filter(|s| s.document_id == id)
            .map(|s| s.id.0)
            .collect();
        let target_ids: Vec<u64> = t
            .targets
            .values()
            .filter(|tg| submission_ids.contains(&tg.submission_id.0))
            .map(|tg| tg.id.0)
            .collect();
        t.units.retain(|k, _| !unit_ids.contains(k));
        t.submissions.retain(|k, _| !submission_ids.contains(k));
        t.targets.retain(|k, _| !target_ids.contains(k));
        t.fragments.retain(|_, f| !target_ids.contains(&f.target_id.0));
        t.snapshots.retain(|_, s| s.document_id != id);
        t.versions.retain(|_, v| !unit_ids.contains(&v.unit_id.0));
        t.record(AuditAction::DocumentDeleted, "document", id.0);
        let mut locks = self.submission_locks.lock();
        for sid in &submission_ids {
            locks.remove(&SubmissionId(*sid));
        }
        drop(locks);
        tracing::info!(document = id.0, "deleted document cascade");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Submissions and targets
    // ------------------------------------------------------------------

    pub fn create_submission(
        &self,
        document_id: DocumentId,
        raw_text: &str,
    ) -> StoreResult<EditSubmission> {
        let mut t = self.tables.write();
        if !t.documents.contains_key(&document_id.0) {
            return Err(StoreError::NotFound {
                entity: "document",
                id: document_id.0,
            });
        }
        let id = SubmissionId(t.next());
        let submission = EditSubmission {
            id,
            document_id,
            raw_text: raw_text.to_string(),
            created_at: Utc::now(),
        };
        t.submissions.insert(id.0, submission.clone());
        t.record(AuditAction::SubmissionCreated, "submission", id.0);
        Ok(submission)
    }

    pub fn submission(&self, id: SubmissionId) -> StoreResult<EditSubmission> {
        self.tables
            .read()
            .submissions
            .get(&id.0)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "submission",
                id: id.0,
            })
    }

    /// Row lock scoping the resolver's check-then-insert window. Concurrent
    /// resolution runs over the same submission serialize on this; runs over
    /// different submissions do not contend.
    pub fn submission_lock(&self, id: SubmissionId) -> Arc<Mutex<()>> {
        self.submission_locks
            .lock()
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Insert a target, enforcing the per-submission instruction uniqueness
    /// rule. The digest is computed here so every write path normalizes the
    /// same way.
    pub fn insert_target(&self, new: NewTarget) -> StoreResult<EditTarget> {
        let digest = instruction_digest(&new.instruction_text);
        let mut t = self.tables.write();
        if !t.submissions.contains_key(&new.submission_id.0) {
            return Err(StoreError::NotFound {
                entity: "submission",
                id: new.submission_id.0,
            });
        }
        let duplicate = t
            .targets
            .values()
            .any(|tg| tg.submission_id == new.submission_id && tg.instruction_digest == digest);
        if duplicate {
            return Err(StoreError::DuplicateInstruction {
                submission: new.submission_id,
                digest,
            });
        }
        let id = TargetId(t.next());
        let target = EditTarget {
            id,
            submission_id: new.submission_id,
            instruction_text: new.instruction_text,
            instruction_digest: digest,
            resolved_unit_id: new.resolved_unit_id,
            status: new.status,
            resolution: new.resolution,
        };
        t.targets.insert(id.0, target.clone());
        Ok(target)
    }

    pub fn target(&self, id: TargetId) -> StoreResult<EditTarget> {
        self.tables
            .read()
            .targets
            .get(&id.0)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "target",
                id: id.0,
            })
    }

    pub fn targets_for_submission(&self, submission_id: SubmissionId) -> Vec<EditTarget> {
        let t = self.tables.read();
        let mut targets: Vec<_> = t
            .targets
            .values()
            .filter(|tg| tg.submission_id == submission_id)
            .cloned()
            .collect();
        targets.sort_by_key(|tg| tg.id);
        targets
    }

    /// Whether an equivalent instruction already exists under the submission.
    pub fn instruction_exists(&self, submission_id: SubmissionId, digest: &str) -> bool {
        self.tables
            .read()
            .targets
            .values()
            .any(|tg| tg.submission_id == submission_id && tg.instruction_digest == digest)
    }

    /// Set or clear a target's unit binding by hand.
    ///
    /// Binding validates that the unit lives in the same document as the
    /// target's submission, then clears review and marks the resolution
    /// manual. Clearing drops only the binding; status and resolution
    /// metadata stay as they were so the review queue is not disturbed.
    pub fn set_resolved_unit(
        &self,
        id: TargetId,
        unit_id: Option<UnitId>,
    ) -> StoreResult<EditTarget> {
        let mut t = self.tables.write();
        if let Some(uid) = unit_id {
            let unit_doc = t
                .units
                .get(&uid.0)
                .map(|u| u.document_id)
                .ok_or(StoreError::NotFound {
                    entity: "unit",
                    id: uid.0,
                })?;
            let submission_id = t
                .targets
                .get(&id.0)
                .map(|tg| tg.submission_id)
                .ok_or(StoreError::NotFound {
                    entity: "target",
                    id: id.0,
                })?;
            let target_doc = t
                .submissions
                .get(&submission_id.0)
                .map(|s| s.document_id)
                .ok_or(StoreError::NotFound {
                    entity: "submission",
                    id: submission_id.0,
                })?;
            if unit_doc != target_doc {
                return Err(StoreError::CrossDocument {
                    target: id,
                    unit: uid,
                });
            }
        }
        let target = t.targets.get_mut(&id.0).ok_or(StoreError::NotFound {
            entity: "target",
            id: id.0,
        })?;
        match unit_id {
            Some(uid) => {
                target.resolved_unit_id = Some(uid);
                target.status = TargetStatus::Pending;
                target.resolution = ResolutionMeta {
                    source: lexforge_model::MatchSource::Manual,
                    confidence: 1.0,
                    address: target.resolution.address.clone(),
                    reason: None,
                };
            }
            None => {
                target.resolved_unit_id = None;
            }
        }
        Ok(target.clone())
    }

    /// User correction: bind a target to a unit by hand and clear review.
    pub fn confirm_target(&self, id: TargetId, unit_id: UnitId) -> StoreResult<EditTarget> {
        self.set_resolved_unit(id, Some(unit_id))
    }

    pub fn update_target_status(&self, id: TargetId, status: TargetStatus) -> StoreResult<()> {
        let mut t = self.tables.write();
        let target = t.targets.get_mut(&id.0).ok_or(StoreError::NotFound {
            entity: "target",
            id: id.0,
        })?;
        target.status = status;
        Ok(())
    }

    /// Remove a target and its fragment, if any.
    pub fn delete_target(&self, id: TargetId) -> StoreResult<()> {
        let mut t = self.tables.write();
        if t.targets.remove(&id.0).is_none() {
            return Err(StoreError::NotFound {
                entity: "target",
                id: id.0,
            });
        }
        t.fragments.retain(|_, f| f.target_id != id);
        t.record(AuditAction::TargetDeleted, "target", id.0);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fragments
    // ------------------------------------------------------------------

    pub fn fragment_for_target(&self, target_id: TargetId) -> Option<Fragment> {
        self.tables
            .read()
            .fragments
            .values()
            .find(|f| f.target_id == target_id)
            .cloned()
    }

    /// Persist the before/after pair for a target. A target carries at most
    /// one fragment; passing `replace` discards the prior one first.
    pub fn insert_fragment(&self, new: NewFragment, replace: bool) -> StoreResult<Fragment> {
        let mut t = self.tables.write();
        if !t.targets.contains_key(&new.target_id.0) {
            return Err(StoreError::NotFound {
                entity: "target",
                id: new.target_id.0,
            });
        }
        let existing: Option<u64> = t
            .fragments
            .values()
            .find(|f| f.target_id == new.target_id)
            .map(|f| f.id.0);
        if let Some(old) = existing {
            if !replace {
                return Err(StoreError::FragmentExists {
                    target: new.target_id,
                });
            }
            t.fragments.remove(&old);
        }
        let id = FragmentId(t.next());
        let fragment = Fragment {
            id,
            target_id: new.target_id,
            unit_id: new.unit_id,
            before_text: new.before_text,
            after_text: new.after_text,
            change_type: new.change_type,
            oracle_failed: new.oracle_failed,
            committed: false,
        };
        t.fragments.insert(id.0, fragment.clone());
        Ok(fragment)
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Commit every uncommitted clean fragment of a submission as one
    /// snapshot: one [`UnitVersion`] per distinct unit (the latest fragment
    /// wins when several touch the same unit), current-content pointers
    /// advanced, fragments marked consumed. Runs entirely under the write
    /// lock, so the commit is all-or-nothing.
    pub fn commit_snapshot(
        &self,
        submission_id: SubmissionId,
        comment: &str,
    ) -> StoreResult<Snapshot> {
        let mut t = self.tables.write();
        let document_id = t
            .submissions
            .get(&submission_id.0)
            .map(|s| s.document_id)
            .ok_or(StoreError::NotFound {
                entity: "submission",
                id: submission_id.0,
            })?;
        let target_ids: Vec<TargetId> = t
            .targets
            .values()
            .filter(|tg| tg.submission_id == submission_id)
            .map(|tg| tg.id)
            .collect();
        let mut pending: Vec<Fragment> = t
            .fragments
            .values()
            .filter(|f| target_ids.contains(&f.target_id) && !f.committed && !f.oracle_failed)
            .cloned()
            .collect();
        if pending.is_empty() {
            return Err(StoreError::EmptyCommit {
                submission: submission_id,
            });
        }
        pending.sort_by_key(|f| f.id);

        let snapshot_id = SnapshotId(t.next());
        let created_at = Utc::now();
        let snapshot = Snapshot {
            id: snapshot_id,
            document_id,
            created_at,
            comment: comment.to_string(),
        };
        t.snapshots.insert(snapshot_id.0, snapshot.clone());

        // Latest fragment per unit carries the unit's new content.
        let mut latest_per_unit: BTreeMap<u64, String> = BTreeMap::new();
        for fragment in &pending {
            latest_per_unit.insert(fragment.unit_id.0, fragment.after_text.clone());
        }
        for (unit_id, content) in latest_per_unit {
            let version_id = VersionId(t.next());
            t.versions.insert(
                version_id.0,
                UnitVersion {
                    id: version_id,
                    snapshot_id,
                    unit_id: UnitId(unit_id),
                    content,
                    created_at,
                },
            );
            if let Some(unit) = t.units.get_mut(&unit_id) {
                unit.current_version_id = Some(version_id);
            }
        }
        for fragment in &pending {
            if let Some(row) = t.fragments.get_mut(&fragment.id.0) {
                row.committed = true;
            }
        }
        t.record(AuditAction::Commit, "snapshot", snapshot_id.0);
        tracing::info!(
            snapshot = snapshot_id.0,
            fragments = pending.len(),
            "committed snapshot"
        );
        Ok(snapshot)
    }

    pub fn snapshots_for_document(&self, document_id: DocumentId) -> Vec<Snapshot> {
        let t = self.tables.read();
        let mut snapshots: Vec<_> = t
            .snapshots
            .values()
            .filter(|s| s.document_id == document_id)
            .cloned()
            .collect();
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }

    // ------------------------------------------------------------------
    // Audit and persistence
    // ------------------------------------------------------------------

    pub fn record_audit(&self, action: AuditAction, entity_kind: &str, entity_id: u64) {
        self.tables.write().record(action, entity_kind, entity_id);
    }

    pub fn audit_log(&self) -> Vec<AuditRecord> {
        self.tables.read().audit.clone()
    }

    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let t = self.tables.read();
        let json = serde_json::to_string_pretty(&*t)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> StoreResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let tables: Tables = serde_json::from_str(&json)?;
        Ok(Self {
            tables: RwLock::new(tables),
            submission_locks: Mutex::new(HashMap::new()),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use lexforge_model::MatchSource;

    fn store_with_unit() -> (Store, DocumentId, UnitId) {
        let store = Store::new();
        let doc = store.create_document("НК РФ", SourceFormat::PlainText, AddressingMode::Flat);
        let unit = store
            .insert_unit(NewUnit {
                document_id: doc.id,
                unit_type: UnitType::Article,
                parent_id: None,
                unit_number: Some("2".to_string()),
                title: "Статья 2".to_string(),
                breadcrumb_path: "Статья 2".to_string(),
                ordinal: 0,
                content: "старое содержание".to_string(),
            })
            .unwrap();
        (store, doc.id, unit.id)
    }

    fn pending_target(store: &Store, submission: SubmissionId, unit: UnitId, text: &str) -> EditTarget {
        store
            .insert_target(NewTarget {
                submission_id: submission,
                instruction_text: text.to_string(),
                resolved_unit_id: Some(unit),
                status: TargetStatus::Pending,
                resolution: ResolutionMeta {
                    source: MatchSource::ExactNumber,
                    confidence: 1.0,
                    address: Some("2".to_string()),
                    reason: None,
                },
            })
            .unwrap()
    }

    #[test]
    fn duplicate_instruction_is_rejected() {
        let (store, doc, unit) = store_with_unit();
        let sub = store.create_submission(doc, "текст").unwrap();
        pending_target(&store, sub.id, unit, "в статье 2 исключить слова");
        // Same instruction modulo whitespace.
        let err = store
            .insert_target(NewTarget {
                submission_id: sub.id,
                instruction_text: "в статье 2\n  исключить   слова".to_string(),
                resolved_unit_id: Some(unit),
                status: TargetStatus::Pending,
                resolution: ResolutionMeta::unresolved("n/a"),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateInstruction { .. }));
        assert_eq!(store.targets_for_submission(sub.id).len(), 1);
    }

    #[test]
    fn fragment_is_one_per_target_unless_replaced() {
        let (store, doc, unit) = store_with_unit();
        let sub = store.create_submission(doc, "текст").unwrap();
        let target = pending_target(&store, sub.id, unit, "заменить слова");
        let make = |after: &str| NewFragment {
            target_id: target.id,
            unit_id: unit,
            before_text: "старое содержание".to_string(),
            after_text: after.to_string(),
            change_type: ChangeType::Modified,
            oracle_failed: false,
        };
        let first = store.insert_fragment(make("новое"), false).unwrap();
        let err = store.insert_fragment(make("другое"), false).unwrap_err();
        assert!(matches!(err, StoreError::FragmentExists { .. }));
        let replaced = store.insert_fragment(make("другое"), true).unwrap();
        assert_ne!(first.id, replaced.id);
        assert_eq!(
            store.fragment_for_target(target.id).unwrap().after_text,
            "другое"
        );
    }

    #[test]
    fn commit_advances_current_text_and_consumes_fragments() {
        let (store, doc, unit) = store_with_unit();
        let sub = store.create_submission(doc, "текст").unwrap();
        let target = pending_target(&store, sub.id, unit, "заменить слова");
        store
            .insert_fragment(
                NewFragment {
                    target_id: target.id,
                    unit_id: unit,
                    before_text: "старое содержание".to_string(),
                    after_text: "новое содержание".to_string(),
                    change_type: ChangeType::Modified,
                    oracle_failed: false,
                },
                false,
            )
            .unwrap();

        let snapshot = store.commit_snapshot(sub.id, "первая правка").unwrap();
        assert_eq!(store.current_text(unit).unwrap(), "новое содержание");
        assert_eq!(store.versions_for_unit(unit).len(), 1);
        assert_eq!(store.snapshots_for_document(doc)[0].id, snapshot.id);
        assert!(store.fragment_for_target(target.id).unwrap().committed);

        // Everything is consumed, so a second commit has nothing to do.
        let err = store.commit_snapshot(sub.id, "повтор").unwrap_err();
        assert!(matches!(err, StoreError::EmptyCommit { .. }));
    }

    #[test]
    fn commit_skips_failed_fragments_and_rejects_empty() {
        let (store, doc, unit) = store_with_unit();
        let sub = store.create_submission(doc, "текст").unwrap();
        let target = pending_target(&store, sub.id, unit, "заменить слова");
        store
            .insert_fragment(
                NewFragment {
                    target_id: target.id,
                    unit_id: unit,
                    before_text: "старое содержание".to_string(),
                    after_text: "[ОШИБКА: не найдено]".to_string(),
                    change_type: ChangeType::Modified,
                    oracle_failed: true,
                },
                false,
            )
            .unwrap();
        let err = store.commit_snapshot(sub.id, "пусто").unwrap_err();
        assert!(matches!(err, StoreError::EmptyCommit { .. }));
        assert!(store.snapshots_for_document(doc).is_empty());
    }

    #[test]
    fn latest_fragment_per_unit_wins_within_a_commit() {
        let (store, doc, unit) = store_with_unit();
        let sub = store.create_submission(doc, "текст").unwrap();
        let a = pending_target(&store, sub.id, unit, "первая правка");
        let b = pending_target(&store, sub.id, unit, "вторая правка");
        for (target, after) in [(a, "промежуточное"), (b, "итоговое")] {
            store
                .insert_fragment(
                    NewFragment {
                        target_id: target.id,
                        unit_id: unit,
                        before_text: String::new(),
                        after_text: after.to_string(),
                        change_type: ChangeType::Modified,
                        oracle_failed: false,
                    },
                    false,
                )
                .unwrap();
        }
        store.commit_snapshot(sub.id, "обе правки").unwrap();
        assert_eq!(store.versions_for_unit(unit).len(), 1);
        assert_eq!(store.current_text(unit).unwrap(), "итоговое");
    }

    #[test]
    fn delete_document_cascades() {
        let (store, doc, unit) = store_with_unit();
        let sub = store.create_submission(doc, "текст").unwrap();
        let target = pending_target(&store, sub.id, unit, "заменить слова");
        store
            .insert_fragment(
                NewFragment {
                    target_id: target.id,
                    unit_id: unit,
                    before_text: String::new(),
                    after_text: "новое".to_string(),
                    change_type: ChangeType::Modified,
                    oracle_failed: false,
                },
                false,
            )
            .unwrap();
        store.commit_snapshot(sub.id, "правка").unwrap();

        store.delete_document(doc).unwrap();
        assert!(store.document(doc).is_err());
        assert!(store.unit(unit).is_err());
        assert!(store.submission(sub.id).is_err());
        assert!(store.target(target.id).is_err());
        assert!(store.fragment_for_target(target.id).is_none());
        assert!(store.snapshots_for_document(doc).is_empty());
        assert!(store.versions_for_unit(unit).is_empty());
    }

    #[test]
    fn confirm_target_rebinds_and_clears_review() {
        let (store, doc, unit) = store_with_unit();
        let sub = store.create_submission(doc, "текст").unwrap();
        let target = store
            .insert_target(NewTarget {
                submission_id: sub.id,
                instruction_text: "неясная правка".to_string(),
                resolved_unit_id: None,
                status: TargetStatus::NeedsReview,
                resolution: ResolutionMeta::unresolved("адрес не распознан"),
            })
            .unwrap();
        let confirmed = store.confirm_target(target.id, unit).unwrap();
        assert_eq!(confirmed.resolved_unit_id, Some(unit));
        assert_eq!(confirmed.status, TargetStatus::Pending);
        assert_eq!(confirmed.resolution.source, MatchSource::Manual);
    }

    #[test]
    fn clearing_the_binding_leaves_status_untouched() {
        let (store, doc, unit) = store_with_unit();
        let sub = store.create_submission(doc, "текст").unwrap();
        // A low-confidence hit: bound, but still queued for review.
        let target = store
            .insert_target(NewTarget {
                submission_id: sub.id,
                instruction_text: "правка по хлебным крошкам".to_string(),
                resolved_unit_id: Some(unit),
                status: TargetStatus::NeedsReview,
                resolution: ResolutionMeta {
                    source: MatchSource::Breadcrumb,
                    confidence: 0.5,
                    address: None,
                    reason: Some("совпадение по подстроке".to_string()),
                },
            })
            .unwrap();
        let cleared = store.set_resolved_unit(target.id, None).unwrap();
        assert_eq!(cleared.resolved_unit_id, None);
        assert_eq!(cleared.status, TargetStatus::NeedsReview);
        assert_eq!(cleared.resolution.source, MatchSource::Breadcrumb);
        assert!(cleared.resolution.reason.is_some());
    }

    #[test]
    fn binding_to_another_documents_unit_is_rejected() {
        let (store, doc, unit) = store_with_unit();
        let sub = store.create_submission(doc, "текст").unwrap();
        let target = pending_target(&store, sub.id, unit, "заменить слова");

        let other_doc =
            store.create_document("ГК РФ", SourceFormat::PlainText, AddressingMode::Flat);
        let foreign_unit = store
            .insert_unit(NewUnit {
                document_id: other_doc.id,
                unit_type: UnitType::Article,
                parent_id: None,
                unit_number: Some("1".to_string()),
                title: "Статья 1".to_string(),
                breadcrumb_path: "Статья 1".to_string(),
                ordinal: 0,
                content: "чужое содержание".to_string(),
            })
            .unwrap();

        let err = store
            .set_resolved_unit(target.id, Some(foreign_unit.id))
            .unwrap_err();
        assert!(matches!(err, StoreError::CrossDocument { .. }));
        // The target keeps its original binding.
        assert_eq!(store.target(target.id).unwrap().resolved_unit_id, Some(unit));
    }

    #[test]
    fn delete_document_prunes_submission_locks() {
        let (store, doc, _unit) = store_with_unit();
        let sub = store.create_submission(doc, "текст").unwrap();
        let before = store.submission_lock(sub.id);
        store.delete_document(doc).unwrap();
        // A fresh lookup allocates a new lock, so the old row lock is gone.
        let after = store.submission_lock(sub.id);
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn save_and_load_round_trip() {
        let (store, doc, unit) = store_with_unit();
        let sub = store.create_submission(doc, "текст").unwrap();
        pending_target(&store, sub.id, unit, "заменить слова");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        store.save(&path).unwrap();

        let restored = Store::load(&path).unwrap();
        assert_eq!(restored.document(doc).unwrap().name, "НК РФ");
        assert_eq!(restored.targets_for_submission(sub.id).len(), 1);
        assert_eq!(
            restored.current_text(unit).unwrap(),
            "старое содержание"
        );
        // Id allocation continues past the restored rows.
        let next = restored.create_submission(doc, "ещё").unwrap();
        assert!(next.id.0 > sub.id.0);
    }
}

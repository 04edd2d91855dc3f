//! Snapshot commits: fragments become document history.

use std::sync::Arc;

use lexforge_model::{Snapshot, SubmissionId};
use lexforge_store::Store;

use crate::error::PipelineResult;

pub struct SnapshotManager {
    store: Arc<Store>,
}

impl SnapshotManager {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Commit a submission's uncommitted clean fragments as one snapshot.
    /// Rejects empty commits; fragments whose oracle reply carried the
    /// failure marker never enter history.
    pub fn commit(&self, submission_id: SubmissionId, comment: &str) -> PipelineResult<Snapshot> {
        let snapshot = self.store.commit_snapshot(submission_id, comment)?;
        tracing::info!(
            submission = submission_id.0,
            snapshot = snapshot.id.0,
            "snapshot committed"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::EditApplier;
    use lexforge_model::{
        AddressingMode, MatchSource, ResolutionMeta, SourceFormat, TargetStatus,
    };
    use lexforge_oracle::mock::SubstitutionOracle;
    use lexforge_store::{NewTarget, StoreError};
    use std::time::Duration;

    #[tokio::test]
    async fn commit_creates_history_and_rejects_a_second_empty_commit() {
        let store = Arc::new(Store::new());
        let (doc, units) = crate::import::import_document(
            &store,
            "кодекс",
            "Статья 2. Здесь старое слово.",
            SourceFormat::PlainText,
            AddressingMode::Flat,
        )
        .unwrap();
        let sub = store.create_submission(doc.id, "правки").unwrap();
        store
            .insert_target(NewTarget {
                submission_id: sub.id,
                instruction_text: "слова 'старое' заменить словами 'новое'".to_string(),
                resolved_unit_id: Some(units[0].id),
                status: TargetStatus::Pending,
                resolution: ResolutionMeta {
                    source: MatchSource::ExactNumber,
                    confidence: 1.0,
                    address: Some("2".to_string()),
                    reason: None,
                },
            })
            .unwrap();
        EditApplier::new(
            store.clone(),
            Arc::new(SubstitutionOracle::new()),
            Duration::from_secs(5),
        )
        .apply(sub.id, false)
        .await
        .unwrap();

        let manager = SnapshotManager::new(store.clone());
        let snapshot = manager.commit(sub.id, "первая волна правок").unwrap();
        assert_eq!(snapshot.document_id, doc.id);
        assert!(store.current_text(units[0].id).unwrap().contains("новое"));
        assert_eq!(store.versions_for_unit(units[0].id).len(), 1);

        let err = manager.commit(sub.id, "повтор").unwrap_err();
        assert!(matches!(
            err,
            crate::error::PipelineError::Store(StoreError::EmptyCommit { .. })
        ));
    }
}

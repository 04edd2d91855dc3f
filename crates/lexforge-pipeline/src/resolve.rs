//! Target resolution: binding instructions to structural units
//!
//! Resolution never fails on bad input; an instruction that cannot be bound
//! becomes a `needs_review` target carrying the failure reason. The
//! correctness-critical part is deduplication: re-running resolution for a
//! submission (including concurrently retried runs) must not create a second
//! target for an equivalent instruction. The existence check and the insert
//! run under the submission's row lock; oracle calls happen strictly before
//! the lock is taken so it is never held across an await.

use std::sync::Arc;

use lexforge_model::{
    instruction_digest, AuditAction, MatchSource, ResolutionMeta, SubmissionId, TargetId,
    TargetStatus, UnitId,
};
use lexforge_oracle::AddressOracle;
use lexforge_parse::InstructionSplitter;
use lexforge_store::{NewTarget, Store, StoreError};

use crate::error::PipelineResult;
use crate::registry::{registry_for, UnitRegistry};

/// Outcome of one resolution run over a submission.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResolveReport {
    pub submission_id: SubmissionId,
    pub created: Vec<TargetId>,
    pub skipped_duplicates: usize,
    pub needs_review: usize,
}

/// One instruction's binding, computed before anything is written.
struct Resolved {
    instruction: String,
    unit_id: Option<UnitId>,
    status: TargetStatus,
    meta: ResolutionMeta,
}

pub struct TargetResolver {
    store: Arc<Store>,
    splitter: InstructionSplitter,
    address_oracle: Arc<dyn AddressOracle>,
}

impl TargetResolver {
    pub fn new(store: Arc<Store>, address_oracle: Arc<dyn AddressOracle>) -> Self {
        Self {
            store,
            splitter: InstructionSplitter::new(),
            address_oracle,
        }
    }

    /// Resolve every instruction of a submission into edit targets.
    pub async fn resolve(&self, submission_id: SubmissionId) -> PipelineResult<ResolveReport> {
        let submission = self.store.submission(submission_id)?;
        let document = self.store.document(submission.document_id)?;
        let units = self.store.units_for_document(document.id);
        let registry = registry_for(document.addressing, &units);
        self.store
            .record_audit(AuditAction::ResolveStarted, "submission", submission_id.0);

        let mut report = ResolveReport {
            submission_id,
            created: Vec::new(),
            skipped_duplicates: 0,
            needs_review: 0,
        };

        for group in self.splitter.group_by_unit(&submission.raw_text) {
            match &group.unit_number {
                // The whole block is addressed to one article; keep it as a
                // single target so the edits stay together.
                Some(number) => {
                    let digest = instruction_digest(&group.text);
                    if self.store.instruction_exists(submission_id, &digest) {
                        report.skipped_duplicates += 1;
                        continue;
                    }
                    let resolved = match self.bind_addressed(&group.text, number, registry.as_ref())
                    {
                        Some(resolved) => resolved,
                        // Number unknown to the registry: the oracle gets a
                        // chance before the target lands in review.
                        None => {
                            self.bind_via_oracle(&group.text, Some(number), registry.as_ref())
                                .await
                        }
                    };
                    self.insert(&mut report, resolved);
                }
                // No address anywhere in the block: fall back to instruction
                // granularity and ask the oracle per instruction.
                None => {
                    for instruction in self.splitter.split(&group.text) {
                        if instruction.is_empty() {
                            continue;
                        }
                        let digest = instruction_digest(&instruction);
                        if self.store.instruction_exists(submission_id, &digest) {
                            // Cheap pre-check so retries skip the oracle; the
                            // authoritative check is under the lock below.
                            report.skipped_duplicates += 1;
                            continue;
                        }
                        let resolved = self
                            .bind_via_oracle(&instruction, None, registry.as_ref())
                            .await;
                        self.insert(&mut report, resolved);
                    }
                }
            }
        }

        tracing::info!(
            submission = submission_id.0,
            created = report.created.len(),
            skipped = report.skipped_duplicates,
            review = report.needs_review,
            "resolution finished"
        );
        Ok(report)
    }

    fn bind_addressed(
        &self,
        text: &str,
        number: &str,
        registry: &dyn UnitRegistry,
    ) -> Option<Resolved> {
        let (unit_id, source) = registry.lookup_number(number)?;
        Some(Resolved {
            instruction: text.to_string(),
            unit_id: Some(unit_id),
            status: registry.status_for(source),
            meta: ResolutionMeta {
                source,
                confidence: 1.0,
                address: Some(number.to_string()),
                reason: None,
            },
        })
    }

    async fn bind_via_oracle(
        &self,
        instruction: &str,
        address: Option<&str>,
        registry: &dyn UnitRegistry,
    ) -> Resolved {
        let candidates = registry.candidates();
        let answer = match self
            .address_oracle
            .match_address(instruction, &candidates)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                // Oracle trouble downgrades to review, never aborts the run.
                tracing::warn!(error = %e, "address oracle failed");
                return Resolved {
                    instruction: instruction.to_string(),
                    unit_id: None,
                    status: TargetStatus::NeedsReview,
                    meta: ResolutionMeta {
                        address: address.map(str::to_string),
                        ..ResolutionMeta::unresolved(format!("сбой оракула адресации: {e}"))
                    },
                };
            }
        };

        // Trust the answer only if it is really one of the candidates.
        let verified = answer
            .filter(|label| candidates.iter().any(|c| c == label))
            .and_then(|label| registry.by_candidate(&label).map(|id| (id, label)));

        match verified {
            Some((unit_id, label)) => Resolved {
                instruction: instruction.to_string(),
                unit_id: Some(unit_id),
                status: registry.status_for(MatchSource::Oracle),
                meta: ResolutionMeta {
                    source: MatchSource::Oracle,
                    confidence: 0.8,
                    // The address as written wins over the oracle's label.
                    address: address.map(str::to_string).or(Some(label)),
                    reason: None,
                },
            },
            None => {
                let reason = match address {
                    Some(number) => format!("статья {number} отсутствует в документе"),
                    None => "адрес правки не распознан".to_string(),
                };
                Resolved {
                    instruction: instruction.to_string(),
                    unit_id: None,
                    status: TargetStatus::NeedsReview,
                    meta: ResolutionMeta {
                        address: address.map(str::to_string),
                        ..ResolutionMeta::unresolved(reason)
                    },
                }
            }
        }
    }

    /// Check-then-insert under the submission row lock.
    fn insert(&self, report: &mut ResolveReport, resolved: Resolved) {
        let lock = self.store.submission_lock(report.submission_id);
        let _guard = lock.lock();

        let digest = instruction_digest(&resolved.instruction);
        if self.store.instruction_exists(report.submission_id, &digest) {
            report.skipped_duplicates += 1;
            return;
        }
        match self.store.insert_target(NewTarget {
            submission_id: report.submission_id,
            instruction_text: resolved.instruction,
            resolved_unit_id: resolved.unit_id,
            status: resolved.status,
            resolution: resolved.meta,
        }) {
            Ok(target) => {
                if target.status == TargetStatus::NeedsReview {
                    report.needs_review += 1;
                }
                report.created.push(target.id);
            }
            // Lost a race with a concurrent run between check and insert is
            // impossible under the lock, but the store enforces the index
            // regardless; treat it the same as the check.
            Err(StoreError::DuplicateInstruction { .. }) => report.skipped_duplicates += 1,
            Err(e) => {
                tracing::error!(error = %e, "target insert failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexforge_model::{AddressingMode, SourceFormat};
    use lexforge_oracle::mock::{ScriptedAddressOracle, SubstringAddressOracle};

    const DOC: &str = "Статья 1. Текст.\nСтатья 2. Другой текст.";

    async fn setup(
        addressing: AddressingMode,
        oracle: Arc<dyn AddressOracle>,
    ) -> (Arc<Store>, TargetResolver, SubmissionId) {
        let store = Arc::new(Store::new());
        let (doc, _) = crate::import::import_document(
            &store,
            "кодекс",
            DOC,
            SourceFormat::PlainText,
            addressing,
        )
        .unwrap();
        let sub = store
            .create_submission(doc.id, "1) в статье 2 слова 'старое' заменить словами 'новое'")
            .unwrap();
        let resolver = TargetResolver::new(store.clone(), oracle);
        (store, resolver, sub.id)
    }

    #[tokio::test]
    async fn exact_number_resolves_pending_in_flat_mode() {
        let (store, resolver, sub) =
            setup(AddressingMode::Flat, Arc::new(SubstringAddressOracle)).await;
        let report = resolver.resolve(sub).await.unwrap();
        assert_eq!(report.created.len(), 1);
        let target = store.target(report.created[0]).unwrap();
        assert_eq!(target.status, TargetStatus::Pending);
        assert_eq!(target.resolution.source, MatchSource::ExactNumber);
        let unit = store.unit(target.resolved_unit_id.unwrap()).unwrap();
        assert_eq!(unit.unit_number.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn exact_number_needs_review_in_hierarchical_mode() {
        let (store, resolver, sub) =
            setup(AddressingMode::Hierarchical, Arc::new(SubstringAddressOracle)).await;
        let report = resolver.resolve(sub).await.unwrap();
        let target = store.target(report.created[0]).unwrap();
        assert_eq!(target.status, TargetStatus::NeedsReview);
        assert_eq!(target.resolution.source, MatchSource::Breadcrumb);
        assert!(target.resolved_unit_id.is_some());
    }

    #[tokio::test]
    async fn rerun_skips_equivalent_instructions() {
        let (store, resolver, sub) =
            setup(AddressingMode::Flat, Arc::new(SubstringAddressOracle)).await;
        let first = resolver.resolve(sub).await.unwrap();
        let second = resolver.resolve(sub).await.unwrap();
        assert_eq!(first.created.len(), 1);
        assert!(second.created.is_empty());
        assert_eq!(second.skipped_duplicates, 1);
        assert_eq!(store.targets_for_submission(sub).len(), 1);
    }

    #[tokio::test]
    async fn concurrent_reruns_create_one_target_set() {
        let (store, resolver, sub) =
            setup(AddressingMode::Flat, Arc::new(SubstringAddressOracle)).await;
        let resolver = Arc::new(resolver);
        let (a, b) = tokio::join!(
            {
                let r = resolver.clone();
                async move { r.resolve(sub).await }
            },
            {
                let r = resolver.clone();
                async move { r.resolve(sub).await }
            }
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.created.len() + b.created.len(), 1);
        assert_eq!(store.targets_for_submission(sub).len(), 1);
    }

    #[tokio::test]
    async fn addressless_instruction_goes_through_the_oracle() {
        let store = Arc::new(Store::new());
        let (doc, _) = crate::import::import_document(
            &store,
            "кодекс",
            DOC,
            SourceFormat::PlainText,
            AddressingMode::Flat,
        )
        .unwrap();
        let sub = store
            .create_submission(doc.id, "заменить слово 'старый' словом 'новый'")
            .unwrap();
        let oracle = Arc::new(ScriptedAddressOracle::new().answer("2"));
        let resolver = TargetResolver::new(store.clone(), oracle);
        let report = resolver.resolve(sub.id).await.unwrap();
        let target = store.target(report.created[0]).unwrap();
        assert_eq!(target.status, TargetStatus::Pending);
        assert_eq!(target.resolution.source, MatchSource::Oracle);
        assert!(target.resolved_unit_id.is_some());
    }

    #[tokio::test]
    async fn hallucinated_oracle_answer_is_rejected() {
        let store = Arc::new(Store::new());
        let (doc, _) = crate::import::import_document(
            &store,
            "кодекс",
            DOC,
            SourceFormat::PlainText,
            AddressingMode::Flat,
        )
        .unwrap();
        let sub = store
            .create_submission(doc.id, "исключить второй абзац")
            .unwrap();
        let oracle = Arc::new(ScriptedAddressOracle::new().answer("99"));
        let resolver = TargetResolver::new(store.clone(), oracle);
        let report = resolver.resolve(sub.id).await.unwrap();
        let target = store.target(report.created[0]).unwrap();
        assert_eq!(target.status, TargetStatus::NeedsReview);
        assert_eq!(target.resolved_unit_id, None);
        assert_eq!(target.resolution.source, MatchSource::Unresolved);
        assert_eq!(report.needs_review, 1);
    }

    #[tokio::test]
    async fn unknown_number_is_delegated_to_the_oracle() {
        let store = Arc::new(Store::new());
        let (doc, _) = crate::import::import_document(
            &store,
            "кодекс",
            DOC,
            SourceFormat::PlainText,
            AddressingMode::Flat,
        )
        .unwrap();
        let sub = store
            .create_submission(doc.id, "в статье 40 исключить слова 'например'")
            .unwrap();
        // The registry has no article 40, but the oracle can still place the
        // instruction on an existing candidate.
        let oracle = Arc::new(ScriptedAddressOracle::new().answer("2"));
        let resolver = TargetResolver::new(store.clone(), oracle);
        let report = resolver.resolve(sub.id).await.unwrap();
        let target = store.target(report.created[0]).unwrap();
        assert_eq!(target.status, TargetStatus::Pending);
        assert_eq!(target.resolution.source, MatchSource::Oracle);
        assert_eq!(target.resolution.address.as_deref(), Some("40"));
        let unit = store.unit(target.resolved_unit_id.unwrap()).unwrap();
        assert_eq!(unit.unit_number.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn unknown_article_number_is_recorded_for_review() {
        let store = Arc::new(Store::new());
        let (doc, _) = crate::import::import_document(
            &store,
            "кодекс",
            DOC,
            SourceFormat::PlainText,
            AddressingMode::Flat,
        )
        .unwrap();
        let sub = store
            .create_submission(doc.id, "в статье 40 исключить слова 'например'")
            .unwrap();
        let resolver = TargetResolver::new(store.clone(), Arc::new(SubstringAddressOracle));
        let report = resolver.resolve(sub.id).await.unwrap();
        let target = store.target(report.created[0]).unwrap();
        assert_eq!(target.status, TargetStatus::NeedsReview);
        assert_eq!(target.resolution.address.as_deref(), Some("40"));
        assert!(target.resolution.reason.is_some());
    }
}

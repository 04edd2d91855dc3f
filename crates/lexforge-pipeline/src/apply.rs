//! Edit application: turning confirmed targets into fragments
//!
//! Each eligible target gets one oracle call and at most one fragment.
//! Progress is persisted per target, so a crash mid-batch leaves all
//! previously produced fragments in place and a re-run picks up where it
//! stopped. An oracle error or timeout fails that one target and the batch
//! moves on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lexforge_model::{
    AuditAction, ChangeType, SubmissionId, TargetId, TargetStatus, UnitId,
};
use lexforge_oracle::{is_failure_reply, TransformOracle};
use lexforge_store::{NewFragment, Store};

use crate::error::PipelineResult;

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum TargetOutcome {
    Applied { oracle_failed: bool },
    Skipped { reason: String },
    Errored { error: String },
}

/// Per-target outcomes of one application run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ApplyReport {
    pub submission_id: SubmissionId,
    pub applied: usize,
    pub skipped: usize,
    pub errored: usize,
    pub outcomes: Vec<(TargetId, TargetOutcome)>,
}

impl ApplyReport {
    fn push(&mut self, target: TargetId, outcome: TargetOutcome) {
        match &outcome {
            TargetOutcome::Applied { .. } => self.applied += 1,
            TargetOutcome::Skipped { .. } => self.skipped += 1,
            TargetOutcome::Errored { .. } => self.errored += 1,
        }
        self.outcomes.push((target, outcome));
    }
}

pub struct EditApplier {
    store: Arc<Store>,
    oracle: Arc<dyn TransformOracle>,
    /// Bound on a single oracle call; hitting it fails that target only.
    oracle_timeout: Duration,
}

impl EditApplier {
    pub fn new(store: Arc<Store>, oracle: Arc<dyn TransformOracle>, oracle_timeout: Duration) -> Self {
        Self {
            store,
            oracle,
            oracle_timeout,
        }
    }

    pub async fn apply(
        &self,
        submission_id: SubmissionId,
        force_reapply: bool,
    ) -> PipelineResult<ApplyReport> {
        // Validates the submission exists before any work.
        let _ = self.store.submission(submission_id)?;
        self.store
            .record_audit(AuditAction::ApplyStarted, "submission", submission_id.0);

        let mut report = ApplyReport {
            submission_id,
            applied: 0,
            skipped: 0,
            errored: 0,
            outcomes: Vec::new(),
        };

        // Edits to the same unit within one batch chain through this map so
        // each later instruction sees the earlier rewrite.
        let mut working: HashMap<UnitId, String> = HashMap::new();

        for target in self.store.targets_for_submission(submission_id) {
            let unit_id = match target.resolved_unit_id {
                Some(id) => id,
                None => {
                    report.push(
                        target.id,
                        TargetOutcome::Skipped {
                            reason: "цель не привязана к единице".to_string(),
                        },
                    );
                    continue;
                }
            };
            if target.status == TargetStatus::NeedsReview {
                report.push(
                    target.id,
                    TargetOutcome::Skipped {
                        reason: "ожидает подтверждения".to_string(),
                    },
                );
                continue;
            }
            if self.store.fragment_for_target(target.id).is_some() && !force_reapply {
                report.push(
                    target.id,
                    TargetOutcome::Skipped {
                        reason: "фрагмент уже создан".to_string(),
                    },
                );
                continue;
            }

            let before = match working.get(&unit_id) {
                Some(text) => text.clone(),
                None => self.store.current_text(unit_id)?,
            };

            let reply = tokio::time::timeout(
                self.oracle_timeout,
                self.oracle.transform(&before, &target.instruction_text),
            )
            .await;

            let after = match reply {
                Ok(Ok(after)) => after,
                Ok(Err(e)) => {
                    tracing::warn!(target = target.id.0, error = %e, "transform oracle failed");
                    self.store.update_target_status(target.id, TargetStatus::Failed)?;
                    report.push(target.id, TargetOutcome::Errored { error: e.to_string() });
                    continue;
                }
                Err(_) => {
                    tracing::warn!(target = target.id.0, "transform oracle timed out");
                    self.store.update_target_status(target.id, TargetStatus::Failed)?;
                    report.push(
                        target.id,
                        TargetOutcome::Errored {
                            error: "превышено время ожидания оракула".to_string(),
                        },
                    );
                    continue;
                }
            };

            let oracle_failed = is_failure_reply(&after);
            let change_type = if oracle_failed {
                ChangeType::Modified
            } else if after.trim().is_empty() {
                ChangeType::Deleted
            } else if before.trim().is_empty() {
                ChangeType::Added
            } else {
                ChangeType::Modified
            };

            self.store.insert_fragment(
                NewFragment {
                    target_id: target.id,
                    unit_id,
                    before_text: before.clone(),
                    after_text: after.clone(),
                    change_type,
                    oracle_failed,
                },
                force_reapply,
            )?;
            self.store
                .update_target_status(target.id, TargetStatus::Completed)?;
            if !oracle_failed {
                working.insert(unit_id, after);
            }
            report.push(target.id, TargetOutcome::Applied { oracle_failed });
        }

        tracing::info!(
            submission = submission_id.0,
            applied = report.applied,
            skipped = report.skipped,
            errored = report.errored,
            "application finished"
        );
        Ok(report)
    }
}

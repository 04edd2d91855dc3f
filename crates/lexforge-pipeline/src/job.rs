//! Background jobs for the two long-running stages
//!
//! Callers submit a job and poll its status by id. Jobs for different
//! submissions run fully in parallel; racing runs over the same submission
//! are safe because resolution dedups under the submission lock and
//! application is idempotent without force-reapply.

use std::collections::HashMap;
use std::sync::Arc;

use lexforge_model::{JobId, SubmissionId};
use parking_lot::RwLock;

use crate::apply::{ApplyReport, EditApplier};
use crate::resolve::{ResolveReport, TargetResolver};

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum JobReport {
    Resolve(ResolveReport),
    Apply(ApplyReport),
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum JobStatus {
    Running,
    Completed { report: JobReport },
    Failed { error: String },
}

pub struct JobManager {
    resolver: Arc<TargetResolver>,
    applier: Arc<EditApplier>,
    jobs: Arc<RwLock<HashMap<JobId, JobStatus>>>,
}

impl JobManager {
    pub fn new(resolver: Arc<TargetResolver>, applier: Arc<EditApplier>) -> Self {
        Self {
            resolver,
            applier,
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn submit_resolve(&self, submission_id: SubmissionId) -> JobId {
        let id = uuid::Uuid::new_v4();
        self.jobs.write().insert(id, JobStatus::Running);
        let resolver = self.resolver.clone();
        let jobs = self.jobs.clone();
        tokio::spawn(async move {
            let status = match resolver.resolve(submission_id).await {
                Ok(report) => JobStatus::Completed {
                    report: JobReport::Resolve(report),
                },
                Err(e) => JobStatus::Failed {
                    error: e.to_string(),
                },
            };
            jobs.write().insert(id, status);
        });
        id
    }

    pub fn submit_apply(&self, submission_id: SubmissionId, force_reapply: bool) -> JobId {
        let id = uuid::Uuid::new_v4();
        self.jobs.write().insert(id, JobStatus::Running);
        let applier = self.applier.clone();
        let jobs = self.jobs.clone();
        tokio::spawn(async move {
            let status = match applier.apply(submission_id, force_reapply).await {
                Ok(report) => JobStatus::Completed {
                    report: JobReport::Apply(report),
                },
                Err(e) => JobStatus::Failed {
                    error: e.to_string(),
                },
            };
            jobs.write().insert(id, status);
        });
        id
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.jobs.read().get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexforge_model::{AddressingMode, SourceFormat};
    use lexforge_oracle::mock::{SubstitutionOracle, SubstringAddressOracle};
    use lexforge_store::Store;
    use std::time::Duration;

    async fn wait_done(manager: &JobManager, id: JobId) -> JobStatus {
        for _ in 0..100 {
            match manager.status(id) {
                Some(JobStatus::Running) | None => {
                    tokio::time::sleep(Duration::from_millis(10)).await
                }
                Some(done) => return done,
            }
        }
        panic!("job {id} did not finish");
    }

    #[tokio::test]
    async fn resolve_then_apply_via_jobs() {
        let store = Arc::new(Store::new());
        let (doc, _) = crate::import::import_document(
            &store,
            "кодекс",
            "Статья 2. Здесь старое слово.",
            SourceFormat::PlainText,
            AddressingMode::Flat,
        )
        .unwrap();
        let sub = store
            .create_submission(doc.id, "1) в статье 2 слова 'старое' заменить словами 'новое'")
            .unwrap();

        let manager = JobManager::new(
            Arc::new(TargetResolver::new(
                store.clone(),
                Arc::new(SubstringAddressOracle),
            )),
            Arc::new(EditApplier::new(
                store.clone(),
                Arc::new(SubstitutionOracle::new()),
                Duration::from_secs(5),
            )),
        );

        let resolve_job = manager.submit_resolve(sub.id);
        let status = wait_done(&manager, resolve_job).await;
        assert!(matches!(
            status,
            JobStatus::Completed {
                report: JobReport::Resolve(_)
            }
        ));

        let apply_job = manager.submit_apply(sub.id, false);
        match wait_done(&manager, apply_job).await {
            JobStatus::Completed {
                report: JobReport::Apply(report),
            } => {
                assert_eq!(report.applied, 1);
                assert_eq!(report.errored, 0);
            }
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_submission_fails_the_job() {
        let store = Arc::new(Store::new());
        let manager = JobManager::new(
            Arc::new(TargetResolver::new(
                store.clone(),
                Arc::new(SubstringAddressOracle),
            )),
            Arc::new(EditApplier::new(
                store,
                Arc::new(SubstitutionOracle::new()),
                Duration::from_secs(5),
            )),
        );
        let job = manager.submit_resolve(lexforge_model::SubmissionId(404));
        assert!(matches!(
            wait_done(&manager, job).await,
            JobStatus::Failed { .. }
        ));
    }
}

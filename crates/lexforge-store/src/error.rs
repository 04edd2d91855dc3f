use lexforge_model::{SubmissionId, TargetId, UnitId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("submission {submission} already carries an equivalent instruction (digest {digest})")]
    DuplicateInstruction {
        submission: SubmissionId,
        digest: String,
    },

    #[error("unit {unit} belongs to a different document than target {target}")]
    CrossDocument { target: TargetId, unit: UnitId },

    #[error("target {target} already has a fragment; force-reapply to replace it")]
    FragmentExists { target: TargetId },

    #[error("submission {submission} has no uncommitted fragments to commit")]
    EmptyCommit { submission: SubmissionId },

    #[error("persistence io: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence encoding: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

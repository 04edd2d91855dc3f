use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] lexforge_store::StoreError),

    #[error(transparent)]
    Oracle(#[from] lexforge_oracle::OracleError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

use policyscout_search::SearchError;
use policyscout_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("search error: {0}")]
    Search(#[from] SearchError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("run {0} not found")]
    RunNotFound(Uuid),
    #[error("could not interpret policy idea: {0}")]
    Interpretation(String),
    #[error("run cancelled")]
    Cancelled,
}
